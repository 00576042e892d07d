use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::models::{Options, ProfileDescriptor};
use crate::ports::LookupStore;

pub const IPXE_EXTENSION: &str = ".ipxe";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileInfo {
    pub name: String,
    pub size: u64,
}

/// Directory of artifact templates, one file per profile name.
#[derive(Debug, Clone)]
pub struct ProfileLibrary {
    dir: PathBuf,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

impl ProfileLibrary {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn get(&self, name: &str) -> KernelResult<String> {
        if !valid_name(name) {
            return Err(KernelError::not_found(format!("Profile {name} not found")));
        }
        match fs::read_to_string(self.dir.join(name)).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(KernelError::not_found(format!("Profile {name} not found")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self) -> KernelResult<Vec<ProfileInfo>> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                out.push(ProfileInfo {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: meta.len(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    pub async fn put(&self, name: &str, body: &[u8]) -> KernelResult<ProfileInfo> {
        if !valid_name(name) {
            return Err(KernelError::bad_request(format!("Invalid profile name {name}")));
        }
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.dir.join(name), body).await?;
        debug!(profile = name, bytes = body.len(), "profile stored");
        Ok(ProfileInfo { name: name.to_string(), size: body.len() as u64 })
    }
}

fn lookup_path<'a>(options: &'a Options, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = options.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Substitutes `<%= path %>` / `<%- path %>` output tags. Other tags are dropped.
pub fn render_template(template: &str, options: &Options) -> KernelResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("<%") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("%>").ok_or_else(|| {
            KernelError::rendering("Unterminated template tag", StatusCode::INTERNAL_SERVER_ERROR)
        })?;
        let tag = &after[..end];
        if let Some(path) = tag.strip_prefix('=').or_else(|| tag.strip_prefix('-')) {
            out.push_str(&display(lookup_path(options, path.trim())));
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Request-scoped facts that feed the template options.
#[derive(Debug, Clone, Default)]
pub struct RenderScope {
    pub requester_ip: Option<String>,
}

pub struct Renderer {
    library: ProfileLibrary,
    config: Arc<KernelConfig>,
    lookups: Arc<dyn LookupStore>,
}

impl Renderer {
    pub fn new(library: ProfileLibrary, config: Arc<KernelConfig>, lookups: Arc<dyn LookupStore>) -> Self {
        Self { library, config, lookups }
    }

    pub fn library(&self) -> &ProfileLibrary {
        &self.library
    }

    pub async fn local_options(&self, descriptor: &ProfileDescriptor, scope: &RenderScope) -> Options {
        let server = &self.config.server;
        let mut local = Options::new();

        let proxy = descriptor
            .context
            .as_ref()
            .and_then(|ctx| ctx.get("proxy"))
            .and_then(Value::as_str);
        let (server_host, api_server) = match proxy {
            Some(proxy) => (proxy.to_string(), proxy.to_string()),
            None => (
                server.address.clone(),
                format!("{}://{}:{}", server.protocol, server.address, server.port),
            ),
        };

        local.insert("server".into(), Value::String(server_host));
        local.insert("port".into(), Value::from(server.port));
        local.insert("protocol".into(), Value::String(server.protocol.clone()));
        local.insert("apiServerAddress".into(), Value::String(server.address.clone()));
        local.insert("apiServerPort".into(), Value::from(server.port));
        local.insert("apiServer".into(), Value::String(api_server));

        for (key, value) in &self.config.env {
            local.insert(key.clone(), Value::String(value.clone()));
        }

        if let Some(ip) = &scope.requester_ip {
            local.insert("ipaddress".into(), Value::String(ip.clone()));
            if !descriptor.ignore_lookup {
                match self.lookups.find_one_by_term(ip).await {
                    Ok(Some(record)) => {
                        local.insert("macaddress".into(), Value::String(record.mac_address));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(%ip, error = %e, "mac lookup for render failed"),
                }
            }
        }
        local
    }

    /// Local options first, then the resolved profile options on top.
    pub async fn render(&self, descriptor: &ProfileDescriptor, scope: &RenderScope) -> KernelResult<String> {
        let mut options = self.local_options(descriptor, scope).await;
        for (key, value) in &descriptor.options {
            options.insert(key.clone(), value.clone());
        }

        let body = self.library.get(&descriptor.profile).await?;
        let source = if descriptor.profile.ends_with(IPXE_EXTENSION) {
            let boilerplate = self.library.get(&self.config.profiles.boilerplate).await?;
            boilerplate + &body
        } else {
            body
        };

        render_template(&source, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts(v: Value) -> Options {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_output_tags_are_substituted() {
        let out = render_template(
            "kernel <%= server %>/vmlinuz <%=kargs%>\nid=<%- node.id %>",
            &opts(json!({"server": "10.1.1.1", "kargs": "quiet", "node": {"id": "n1"}})),
        )
        .unwrap();
        assert_eq!(out, "kernel 10.1.1.1/vmlinuz quiet\nid=n1");
    }

    #[test]
    fn test_null_and_missing_render_empty() {
        let out = render_template("[<%= kargs %>][<%= nope.deeper %>]", &opts(json!({"kargs": null}))).unwrap();
        assert_eq!(out, "[][]");
    }

    #[test]
    fn test_numbers_and_objects() {
        let out = render_template("<%= port %> <%= ctx %>", &opts(json!({"port": 8080, "ctx": {"a": 1}}))).unwrap();
        assert_eq!(out, "8080 {\"a\":1}");
    }

    #[test]
    fn test_unterminated_tag_fails() {
        let err = render_template("echo <%= server", &Options::new()).unwrap_err();
        assert_eq!(err.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_library_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let library = ProfileLibrary::new(dir.path().join("profiles"));
        assert!(library.list().await.unwrap().is_empty());

        library.put("redirect.ipxe", b"chain <%= apiServer %>").await.unwrap();
        library.put("a.ipxe", b"#!ipxe").await.unwrap();
        assert_eq!(library.get("redirect.ipxe").await.unwrap(), "chain <%= apiServer %>");

        let names: Vec<_> = library.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a.ipxe", "redirect.ipxe"]);
    }

    #[tokio::test]
    async fn test_library_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let library = ProfileLibrary::new(dir.path());
        assert_eq!(library.get("../etc/passwd").await.unwrap_err().status, Some(StatusCode::NOT_FOUND));
        assert_eq!(library.get("missing.ipxe").await.unwrap_err().status, Some(StatusCode::NOT_FOUND));
        assert_eq!(library.put("a/b", b"x").await.unwrap_err().status, Some(StatusCode::BAD_REQUEST));
    }
}
