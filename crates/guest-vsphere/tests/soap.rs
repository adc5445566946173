//! Session, inventory and guest-process calls against a local `/sdk` stub
//! that answers with canned vim25 envelopes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use guest_vsphere::guest::GuestApi;
use guest_vsphere::{GuestAuth, GuestErrorKind, GuestService, ManagedObjectRef, VsphereConfig};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    /// Password the stub accepts.
    password: &'static str,
    /// Inventory path that resolves to `vm-7`.
    vm_path: Option<&'static str>,
    /// Methods in the order they arrived.
    calls: Vec<String>,
}

type Shared = Arc<Mutex<Script>>;

const GONE_PID: i64 = 404;

fn method_of(body: &str) -> String {
    let end = body.find(r#" xmlns="urn:vim25""#).unwrap();
    let start = body[..end].rfind('<').unwrap() + 1;
    body[start..end].to_string()
}

fn envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"
        ),
        body
    )
}

fn ok(method: &str, inner: &str) -> (StatusCode, String) {
    (
        StatusCode::OK,
        envelope(&format!(r#"<{method}Response xmlns="urn:vim25">{inner}</{method}Response>"#)),
    )
}

fn fault(kind: &str, message: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        envelope(&format!(
            concat!(
                "<soapenv:Fault><faultcode>ServerFaultCode</faultcode>",
                "<faultstring>{}</faultstring>",
                r#"<detail><{}Fault xmlns="urn:vim25" xsi:type="{}"/></detail>"#,
                "</soapenv:Fault>"
            ),
            message, kind, kind
        )),
    )
}

const SERVICE_CONTENT: &str = concat!(
    "<returnval>",
    r#"<rootFolder type="Folder">group-d1</rootFolder>"#,
    r#"<propertyCollector type="PropertyCollector">propertyCollector</propertyCollector>"#,
    r#"<viewManager type="ViewManager">ViewManager</viewManager>"#,
    "<about><fullName>VMware ESXi 8.0.2</fullName><apiVersion>8.0.2.0</apiVersion></about>",
    r#"<sessionManager type="SessionManager">ha-sessionmgr</sessionManager>"#,
    r#"<searchIndex type="SearchIndex">ha-searchindex</searchIndex>"#,
    r#"<guestOperationsManager type="GuestOperationsManager">ha-guestoperations</guestOperationsManager>"#,
    "</returnval>"
);

const GUEST_MANAGERS: &str = concat!(
    r#"<returnval><objects><obj type="GuestOperationsManager">ha-guestoperations</obj>"#,
    r#"<propSet><name>processManager</name><val type="GuestProcessManager" xsi:type="ManagedObjectReference">ha-guest-process</val></propSet>"#,
    r#"<propSet><name>fileManager</name><val type="GuestFileManager" xsi:type="ManagedObjectReference">ha-guest-file</val></propSet>"#,
    "</objects></returnval>"
);

const VM_NAMES: &str = concat!(
    "<returnval>",
    r#"<objects><obj type="VirtualMachine">vm-8</obj><propSet><name>name</name><val xsi:type="xsd:string">db01</val></propSet></objects>"#,
    r#"<objects><obj type="VirtualMachine">vm-7</obj><propSet><name>name</name><val xsi:type="xsd:string">web01</val></propSet></objects>"#,
    "</returnval>"
);

fn pid_of(body: &str) -> i64 {
    let start = body.find("<pids>").unwrap() + "<pids>".len();
    let end = body.find("</pids>").unwrap();
    body[start..end].parse().unwrap()
}

async fn handle_sdk(State(state): State<Shared>, body: String) -> (StatusCode, String) {
    let method = method_of(&body);
    let mut script = state.lock().unwrap();
    script.calls.push(method.clone());

    match method.as_str() {
        "RetrieveServiceContent" => ok(&method, SERVICE_CONTENT),
        "Login" => {
            if body.contains(&format!("<password>{}</password>", script.password)) {
                ok(&method, "<returnval><key>52a1</key><userName>root</userName></returnval>")
            } else {
                fault(
                    "InvalidLogin",
                    "Cannot complete login due to an incorrect user name or password.",
                )
            }
        }
        "Logout" | "DestroyView" => ok(&method, ""),
        "FindByInventoryPath" => match script.vm_path {
            Some(path) if body.contains(&format!("<inventoryPath>{path}</inventoryPath>")) => {
                ok(&method, r#"<returnval type="VirtualMachine">vm-7</returnval>"#)
            }
            _ => ok(&method, ""),
        },
        "CreateContainerView" => ok(&method, r#"<returnval type="ContainerView">session[52a1]view-1</returnval>"#),
        "RetrievePropertiesEx" if body.contains("ContainerView") => ok(&method, VM_NAMES),
        "RetrievePropertiesEx" => ok(&method, GUEST_MANAGERS),
        "ListProcessesInGuest" => {
            let pid = pid_of(&body);
            if pid == GONE_PID {
                fault("GuestProcessNotFound", "The guest process was not found.")
            } else {
                ok(
                    &method,
                    &format!(
                        concat!(
                            "<returnval><name>sh</name><pid>{}</pid><owner>root</owner>",
                            "<cmdLine>/bin/sh -c true</cmdLine>",
                            "<startTime>2024-05-01T10:00:00Z</startTime>",
                            "<endTime>2024-05-01T10:00:05Z</endTime>",
                            "<exitCode>3</exitCode></returnval>"
                        ),
                        pid
                    ),
                )
            }
        }
        other => panic!("unexpected vim25 call {other}"),
    }
}

async fn start_sdk(script: Script) -> (Shared, VsphereConfig) {
    let state: Shared = Arc::new(Mutex::new(script));
    let app = Router::new()
        .route("/sdk", post(handle_sdk))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let config = VsphereConfig {
        host: format!("http://{addr}"),
        username: "root".into(),
        password: "vmware".into(),
        ..Default::default()
    };
    (state, config)
}

fn calls(state: &Shared) -> Vec<String> {
    state.lock().unwrap().calls.clone()
}

#[tokio::test]
async fn invalid_login_is_authentication_error() {
    let (state, mut config) = start_sdk(Script { password: "vmware", ..Default::default() }).await;
    config.password = "wrong".into();

    let mut service = GuestService::new();
    let err = service.connect(&config).await.unwrap_err();

    assert_eq!(err.kind, GuestErrorKind::AuthenticationError);
    assert!(err.to_string().starts_with("Login: Cannot complete login"), "{err}");
    assert!(err.to_string().contains("InvalidLogin"), "{err}");
    assert!(!service.is_connected());
    assert_eq!(calls(&state), ["RetrieveServiceContent", "Login"]);
}

#[tokio::test]
async fn find_vm_uses_inventory_path_when_it_resolves() {
    let (state, config) = start_sdk(Script {
        password: "vmware",
        vm_path: Some("web01"),
        ..Default::default()
    })
    .await;

    let mut service = GuestService::new();
    service.connect(&config).await.unwrap();
    let vm = service.find_vm("web01").await.unwrap();
    service.disconnect().await;

    assert_eq!(vm, ManagedObjectRef::new("VirtualMachine", "vm-7"));
    assert_eq!(
        calls(&state),
        ["RetrieveServiceContent", "Login", "FindByInventoryPath", "Logout"]
    );
}

#[tokio::test]
async fn find_vm_falls_back_to_name_search() {
    let (state, config) = start_sdk(Script { password: "vmware", ..Default::default() }).await;

    let mut service = GuestService::new();
    service.connect(&config).await.unwrap();
    let vm = service.find_vm("web01").await.unwrap();
    service.disconnect().await;

    assert_eq!(vm, ManagedObjectRef::new("VirtualMachine", "vm-7"));
    assert_eq!(
        calls(&state),
        [
            "RetrieveServiceContent",
            "Login",
            "FindByInventoryPath",
            "CreateContainerView",
            "RetrievePropertiesEx",
            "DestroyView",
            "Logout",
        ]
    );
}

#[tokio::test]
async fn unknown_vm_is_not_found() {
    let (state, config) = start_sdk(Script { password: "vmware", ..Default::default() }).await;

    let mut service = GuestService::new();
    service.connect(&config).await.unwrap();
    let err = service.find_vm("ghost").await.unwrap_err();
    service.disconnect().await;

    assert_eq!(err.kind, GuestErrorKind::NotFound);
    assert!(err.to_string().contains("ghost"), "{err}");
    assert!(calls(&state).contains(&"DestroyView".to_string()));
}

#[tokio::test]
async fn list_process_maps_missing_pid_to_none() {
    let (_state, config) = start_sdk(Script {
        password: "vmware",
        vm_path: Some("web01"),
        ..Default::default()
    })
    .await;

    let mut service = GuestService::new();
    service.connect(&config).await.unwrap();
    let guest = service
        .guest("web01", GuestAuth::new("root", "guestpw"))
        .await
        .unwrap();

    assert!(guest.list_process(GONE_PID).await.unwrap().is_none());

    let done = guest.list_process(31).await.unwrap().unwrap();
    assert_eq!(done.pid, 31);
    assert!(done.is_finished());
    assert_eq!(done.exit_code, Some(3));

    drop(guest);
    service.disconnect().await;
}
