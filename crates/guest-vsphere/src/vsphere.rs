//! vSphere Web Services client with session-based authentication.
//!
//! Communicates with vCenter / ESXi via `https://{host}/sdk`.
//! Manages the session lifecycle (login / logout), datacenter pinning,
//! inventory lookup and property retrieval.

use crate::error::{GuestError, GuestErrorKind, GuestResult};
use crate::soap::{self, SoapTransport};
use crate::types::{ManagedObjectRef, ServiceContent, VsphereConfig};
use crate::xml::Element;

use log::{debug, info, warn};
use std::collections::HashMap;

fn service_instance() -> ManagedObjectRef {
    ManagedObjectRef::new("ServiceInstance", "ServiceInstance")
}

/// Properties of one managed object, as returned by the property collector.
#[derive(Debug, Clone)]
pub struct ObjectContent {
    pub obj: ManagedObjectRef,
    /// Property path → `<val>` element.
    pub props: HashMap<String, Element>,
}

impl ObjectContent {
    /// Text value of a simple (string / enum / number) property.
    pub fn text(&self, path: &str) -> Option<&str> {
        self.props
            .get(path)
            .map(|v| v.text.trim())
            .filter(|s| !s.is_empty())
    }

    /// Managed object reference value of a property.
    pub fn moref(&self, path: &str) -> Option<ManagedObjectRef> {
        self.props.get(path).and_then(soap::parse_moref)
    }

    pub(crate) fn from_xml(el: &Element) -> Option<Self> {
        let obj = soap::parse_moref(el.child("obj")?)?;
        let props = el
            .children_named("propSet")
            .filter_map(|p| Some((p.child_text("name")?.to_string(), p.child("val")?.clone())))
            .collect();
        Some(Self { obj, props })
    }
}

/// vim25 API client.
pub struct VsphereClient {
    soap: SoapTransport,
    config: VsphereConfig,
    content: Option<ServiceContent>,
    datacenter: Option<ManagedObjectRef>,
    logged_in: bool,
}

impl VsphereClient {
    /// Build a new client from config (does NOT create a session yet).
    pub fn new(config: &VsphereConfig) -> GuestResult<Self> {
        Ok(Self {
            soap: SoapTransport::new(config)?,
            config: config.clone(),
            content: None,
            datacenter: None,
            logged_in: false,
        })
    }

    pub fn soap(&self) -> &SoapTransport {
        &self.soap
    }

    pub fn config(&self) -> &VsphereConfig {
        &self.config
    }

    /// Whether we have an active session.
    pub fn is_connected(&self) -> bool {
        self.logged_in
    }

    /// Service content (available after [`connect`](Self::connect)).
    pub fn content(&self) -> GuestResult<&ServiceContent> {
        self.content
            .as_ref()
            .ok_or_else(|| GuestError::connection("Not connected to vSphere"))
    }

    // ── Session management ──────────────────────────────────────────

    /// Retrieve the service content, log in, and pin the configured datacenter.
    pub async fn connect(&mut self) -> GuestResult<()> {
        let content = self.retrieve_service_content().await?;
        debug!(
            "Connected to {} (API {})",
            content.full_name.as_deref().unwrap_or("vSphere"),
            content.api_version.as_deref().unwrap_or("?")
        );
        self.content = Some(content);
        self.login().await?;

        if let Some(dc) = self.config.datacenter.clone().filter(|d| !d.is_empty()) {
            self.set_datacenter(&dc).await?;
        }
        Ok(())
    }

    async fn retrieve_service_content(&self) -> GuestResult<ServiceContent> {
        let resp = self
            .soap
            .invoke("RetrieveServiceContent", &soap::moref("_this", &service_instance()))
            .await
            .map_err(|e| match e.kind {
                GuestErrorKind::ConnectionError | GuestErrorKind::Timeout => e,
                _ => GuestError::connection(format!("Failed to reach vSphere endpoint: {e}")),
            })?;
        let rv = resp
            .child("returnval")
            .ok_or_else(|| GuestError::parse("RetrieveServiceContent returned nothing"))?;
        parse_service_content(rv)
    }

    /// SessionManager.Login
    async fn login(&mut self) -> GuestResult<()> {
        let session_manager = self
            .content()?
            .session_manager
            .clone()
            .ok_or_else(|| GuestError::connection("Endpoint exposes no SessionManager"))?;

        let params = format!(
            "{}{}{}",
            soap::moref("_this", &session_manager),
            soap::text("userName", &self.config.username),
            soap::text("password", &self.config.password),
        );
        self.soap.invoke("Login", &params).await?;
        self.logged_in = true;
        info!("Logged in to {} as {}", self.soap.endpoint(), self.config.username);
        Ok(())
    }

    /// SessionManager.Logout; best effort, never fails.
    pub async fn logout(&mut self) {
        if !self.logged_in {
            return;
        }
        let session_manager = self
            .content
            .as_ref()
            .and_then(|c| c.session_manager.clone());
        if let Some(sm) = session_manager {
            if let Err(e) = self.soap.invoke("Logout", &soap::moref("_this", &sm)).await {
                warn!("Logout failed: {e}");
            }
        }
        self.logged_in = false;
    }

    // ── Inventory lookup ────────────────────────────────────────────

    /// SearchIndex.FindByInventoryPath
    pub async fn find_by_inventory_path(&self, path: &str) -> GuestResult<Option<ManagedObjectRef>> {
        let search_index = self
            .content()?
            .search_index
            .clone()
            .ok_or_else(|| GuestError::connection("Endpoint exposes no SearchIndex"))?;
        let params = format!(
            "{}{}",
            soap::moref("_this", &search_index),
            soap::text("inventoryPath", path)
        );
        let resp = self.soap.invoke("FindByInventoryPath", &params).await?;
        Ok(resp.child("returnval").and_then(soap::parse_moref))
    }

    /// Pin a datacenter so relative VM paths resolve under `<dc>/vm/`.
    pub async fn set_datacenter(&mut self, name: &str) -> GuestResult<()> {
        let path = name.trim_start_matches('/');
        let found = self
            .find_by_inventory_path(path)
            .await
            .map_err(|e| e.context(format!("failed to find datacenter {name}")))?;
        match found {
            Some(dc) if dc.kind == "Datacenter" => {
                debug!("Using datacenter {name} ({dc})");
                self.datacenter = Some(dc);
                Ok(())
            }
            _ => Err(GuestError::not_found(format!("datacenter '{name}' not found"))),
        }
    }

    /// Inventory path tried first for a `--vm` argument.
    pub fn inventory_path_for(&self, name: &str) -> String {
        if let Some(absolute) = name.strip_prefix('/') {
            return absolute.to_string();
        }
        match self.config.datacenter.as_deref().filter(|d| !d.is_empty()) {
            Some(dc) => format!("{}/vm/{name}", dc.trim_matches('/')),
            None => name.to_string(),
        }
    }

    /// Resolve a VM by inventory path, falling back to a search by bare name.
    ///
    /// When several VMs share the name, the first one the server returns wins.
    pub async fn find_vm(&self, name: &str) -> GuestResult<ManagedObjectRef> {
        let path = self.inventory_path_for(name);
        match self.find_by_inventory_path(&path).await {
            Ok(Some(obj)) if obj.kind == "VirtualMachine" => return Ok(obj),
            Ok(_) => debug!("No VM at inventory path '{path}', searching by name"),
            Err(e) => debug!("Inventory path lookup for '{path}' failed ({e}), searching by name"),
        }

        let bare = name.trim_end_matches('/').rsplit('/').next().unwrap_or(name);
        let container = match &self.datacenter {
            Some(dc) => dc.clone(),
            None => self.content()?.root_folder.clone(),
        };
        let vms = self
            .retrieve_container(&container, "VirtualMachine", &["name"])
            .await?;
        vms.into_iter()
            .find(|o| o.text("name") == Some(bare))
            .map(|o| o.obj)
            .ok_or_else(|| GuestError::not_found(format!("vm '{name}' not found")))
    }

    // ── Property collector ──────────────────────────────────────────

    /// Retrieve `paths` of a single object.
    pub async fn retrieve_object(
        &self,
        obj: &ManagedObjectRef,
        paths: &[&str],
    ) -> GuestResult<ObjectContent> {
        let spec = format!(
            "<specSet>{}<objectSet>{}<skip>false</skip></objectSet></specSet>",
            prop_set(&obj.kind, paths),
            soap::moref("obj", obj),
        );
        self.retrieve_all(&spec)
            .await?
            .into_iter()
            .find(|o| &o.obj == obj)
            .ok_or_else(|| GuestError::not_found(format!("no properties returned for {obj}")))
    }

    /// Retrieve `paths` of every `kind` object below `container` via a
    /// temporary recursive container view.
    pub async fn retrieve_container(
        &self,
        container: &ManagedObjectRef,
        kind: &str,
        paths: &[&str],
    ) -> GuestResult<Vec<ObjectContent>> {
        let view = self.create_container_view(container, kind).await?;
        let spec = format!(
            concat!(
                "<specSet>{}<objectSet>{}<skip>true</skip>",
                r#"<selectSet xsi:type="TraversalSpec"><name>traverseEntities</name>"#,
                "<type>ContainerView</type><path>view</path><skip>false</skip></selectSet>",
                "</objectSet></specSet>"
            ),
            prop_set(kind, paths),
            soap::moref("obj", &view),
        );
        let result = self.retrieve_all(&spec).await;
        // Skipped if this future is dropped mid-retrieve; the view then
        // lives until Logout ends the session.
        self.destroy_view(&view).await;
        result
    }

    /// RetrievePropertiesEx + ContinueRetrievePropertiesEx until the token runs out.
    async fn retrieve_all(&self, spec_set: &str) -> GuestResult<Vec<ObjectContent>> {
        let collector = self.content()?.property_collector.clone();
        let params = format!("{}{spec_set}<options></options>", soap::moref("_this", &collector));
        let resp = self.soap.invoke("RetrievePropertiesEx", &params).await?;

        let mut objects = Vec::new();
        let mut token = collect_page(&resp, &mut objects);
        while let Some(t) = token {
            let params = format!("{}{}", soap::moref("_this", &collector), soap::text("token", &t));
            let resp = self.soap.invoke("ContinueRetrievePropertiesEx", &params).await?;
            token = collect_page(&resp, &mut objects);
        }
        Ok(objects)
    }

    async fn create_container_view(
        &self,
        container: &ManagedObjectRef,
        kind: &str,
    ) -> GuestResult<ManagedObjectRef> {
        let view_manager = self
            .content()?
            .view_manager
            .clone()
            .ok_or_else(|| GuestError::connection("Endpoint exposes no ViewManager"))?;
        let params = format!(
            "{}{}{}<recursive>true</recursive>",
            soap::moref("_this", &view_manager),
            soap::moref("container", container),
            soap::text("type", kind),
        );
        let resp = self
            .soap
            .invoke("CreateContainerView", &params)
            .await
            .map_err(|e| e.context("failed to create container view"))?;
        resp.child("returnval")
            .and_then(soap::parse_moref)
            .ok_or_else(|| GuestError::parse("CreateContainerView returned no view"))
    }

    async fn destroy_view(&self, view: &ManagedObjectRef) {
        if let Err(e) = self.soap.invoke("DestroyView", &soap::moref("_this", view)).await {
            warn!("Failed to destroy {view}: {e}");
        }
    }
}

fn prop_set(kind: &str, paths: &[&str]) -> String {
    let path_xml: String = paths.iter().map(|p| soap::text("pathSet", p)).collect();
    format!("<propSet>{}{path_xml}</propSet>", soap::text("type", kind))
}

/// Append the objects of one `RetrieveResult` page; returns the continuation token.
fn collect_page(resp: &Element, out: &mut Vec<ObjectContent>) -> Option<String> {
    let rv = resp.child("returnval")?;
    out.extend(rv.children_named("objects").filter_map(ObjectContent::from_xml));
    rv.child_text("token")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn parse_service_content(rv: &Element) -> GuestResult<ServiceContent> {
    let get = |name: &str| rv.child(name).and_then(soap::parse_moref);
    let about = rv.child("about");
    Ok(ServiceContent {
        root_folder: get("rootFolder")
            .ok_or_else(|| GuestError::parse("ServiceContent has no rootFolder"))?,
        property_collector: get("propertyCollector")
            .ok_or_else(|| GuestError::parse("ServiceContent has no propertyCollector"))?,
        view_manager: get("viewManager"),
        session_manager: get("sessionManager"),
        search_index: get("searchIndex"),
        guest_operations_manager: get("guestOperationsManager"),
        api_version: about.and_then(|a| a.child_text("apiVersion")).map(str::to_string),
        full_name: about.and_then(|a| a.child_text("fullName")).map(str::to_string),
    })
}
