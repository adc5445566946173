// ── Guest file transfer: upload, download and cat over transfer URLs ─────────

use crate::error::{GuestError, GuestResult};
use crate::guest::GuestApi;

use futures::StreamExt;
use log::{debug, info};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use url::Url;

/// Plain HTTP client for the single-use `/guestFile` URLs handed out by the
/// guest file manager. Those URLs are served by the ESXi host and carry
/// their own ticket, so no session cookie is needed.
#[derive(Debug, Clone)]
pub struct TransferClient {
    http: Client,
    /// Endpoint whose host replaces a `*` placeholder in transfer URLs.
    endpoint: Option<Url>,
}

impl TransferClient {
    pub fn new(insecure: bool, endpoint: Option<Url>) -> GuestResult<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(insecure)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GuestError::connection(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, endpoint })
    }

    /// Turn a transfer URL into something dialable, filling in a `*` host
    /// with the endpoint host (keeping an explicit port if the URL has one).
    pub fn resolve_url(&self, raw: &str) -> GuestResult<Url> {
        let Some(idx) = raw.find("://*") else {
            return Ok(Url::parse(raw)?);
        };
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| GuestError::transfer(format!("No endpoint host to substitute in {raw}")))?;
        let host = endpoint
            .host_str()
            .ok_or_else(|| GuestError::transfer("Endpoint URL has no host"))?;

        let rest = &raw[idx + 4..];
        let authority = match endpoint.port() {
            Some(port) if !rest.starts_with(':') => format!("{host}:{port}"),
            _ => host.to_string(),
        };
        Ok(Url::parse(&format!("{}://{authority}{rest}", &raw[..idx]))?)
    }

    /// PUT `len` bytes from `file` with an explicit `Content-Length`.
    pub async fn put_file(&self, raw_url: &str, file: tokio::fs::File, len: u64) -> GuestResult<()> {
        let url = self.resolve_url(raw_url)?;
        debug!("PUT {len} bytes to {}", url.path());
        let resp = self
            .http
            .put(url)
            .header(CONTENT_LENGTH, len)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| GuestError::from(e).context("upload failed"))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(GuestError::transfer(format!("upload failed with status: {status}")));
        }
        Ok(())
    }

    /// GET a transfer URL; anything but `200 OK` is an error.
    pub async fn get(&self, raw_url: &str) -> GuestResult<reqwest::Response> {
        let url = self.resolve_url(raw_url)?;
        debug!("GET {}", url.path());
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GuestError::from(e).context("download failed"))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(GuestError::transfer(format!("download failed with status: {status}")));
        }
        Ok(resp)
    }

    /// Whole body in memory (command output files).
    pub async fn fetch_bytes(&self, raw_url: &str) -> GuestResult<Vec<u8>> {
        let resp = self.get(raw_url).await?;
        let body = resp
            .bytes()
            .await
            .map_err(|e| GuestError::from(e).context("failed to read download body"))?;
        Ok(body.to_vec())
    }

    /// Stream the body into `out`; returns the number of bytes written.
    pub async fn copy_to_writer<W>(&self, raw_url: &str, out: &mut W) -> GuestResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let resp = self.get(raw_url).await?;
        write_body(resp, out).await
    }
}

/// Drain an already status-checked response into `out`.
pub async fn write_body<W>(resp: reqwest::Response, out: &mut W) -> GuestResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GuestError::from(e).context("download interrupted"))?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

// ── Flows over a guest ───────────────────────────────────────────────────────

/// Copy a local file into the guest, replacing any existing file.
pub async fn upload(
    guest: &dyn GuestApi,
    http: &TransferClient,
    local: &Path,
    remote: &str,
) -> GuestResult<u64> {
    let file = tokio::fs::File::open(local)
        .await
        .map_err(|e| GuestError::from(e).context(format!("failed to open {}", local.display())))?;
    let size = file.metadata().await?.len();

    let url = guest.initiate_transfer_to_guest(remote, size, true).await?;
    http.put_file(&url, file, size).await?;
    info!("Uploaded {} ({size} bytes) to {remote}", local.display());
    Ok(size)
}

/// Copy a guest file to a local file. The local file is only created
/// (truncated) once the host has answered `200 OK`.
pub async fn download(
    guest: &dyn GuestApi,
    http: &TransferClient,
    remote: &str,
    local: &Path,
) -> GuestResult<u64> {
    let info = guest.initiate_transfer_from_guest(remote).await?;
    debug!("{remote} is {} bytes in the guest", info.size);
    let resp = http.get(&info.url).await?;
    let mut file = tokio::fs::File::create(local)
        .await
        .map_err(|e| GuestError::from(e).context(format!("failed to create {}", local.display())))?;
    let written = write_body(resp, &mut file).await?;
    info!("Downloaded {remote} ({written} bytes) to {}", local.display());
    Ok(written)
}

/// Stream a guest file into `out` (stdout for the `cat` command).
pub async fn cat<W>(guest: &dyn GuestApi, http: &TransferClient, remote: &str, out: &mut W) -> GuestResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let info = guest.initiate_transfer_from_guest(remote).await?;
    http.copy_to_writer(&info.url, out).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(endpoint: &str) -> TransferClient {
        TransferClient::new(false, Some(Url::parse(endpoint).unwrap())).unwrap()
    }

    #[test]
    fn test_star_host_replaced() {
        let c = client_for("https://vcsa.lab/sdk");
        assert_eq!(
            c.resolve_url("https://*/guestFile?id=1&token=t").unwrap().as_str(),
            "https://vcsa.lab/guestFile?id=1&token=t"
        );
    }

    #[test]
    fn test_star_host_keeps_explicit_port() {
        let c = client_for("https://vcsa.lab:8443/sdk");
        assert_eq!(
            c.resolve_url("https://*:9443/guestFile?id=2").unwrap().as_str(),
            "https://vcsa.lab:9443/guestFile?id=2"
        );
        assert_eq!(
            c.resolve_url("https://*/guestFile?id=3").unwrap().as_str(),
            "https://vcsa.lab:8443/guestFile?id=3"
        );
    }

    #[test]
    fn test_concrete_host_untouched() {
        let c = client_for("https://vcsa.lab/sdk");
        assert_eq!(
            c.resolve_url("https://esx01.lab:443/guestFile?id=4").unwrap().as_str(),
            "https://esx01.lab/guestFile?id=4"
        );
    }

    #[test]
    fn test_star_without_endpoint_is_error() {
        let c = TransferClient::new(false, None).unwrap();
        assert!(c.resolve_url("https://*/guestFile").is_err());
    }
}
