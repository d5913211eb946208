//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds a full [`AppContext`] over temporary upload and
//! output directories with an explicit tool registry, so tests never pick up
//! a real encoder from `PATH`. On unix, [`write_script`] creates shell-script
//! stand-ins for the external tools.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use vc_av::ToolRegistry;
use vc_core::config::{Config, StorageConfig};
use vc_server::context::AppContext;
use vc_server::router::build_router;

/// Emits ten carriage-return status lines covering 1..10s of media, then
/// writes a small output unless the last argument is `-` (a stats-only pass).
pub const ENCODER_SCRIPT: &str = r#"
for last; do :; done
echo "Input #0, fake, from 'input':" >&2
for t in 1 2 3 4 5 6 7 8 9 10; do
  printf 'frame=%d fps=30.0 q=28.0 size=N/A time=00:00:%02d.00 bitrate=N/A speed=2.00x\r' "$((t * 30))" "$t" >&2
  sleep 0.05
done
printf '\n' >&2
if [ "$last" != "-" ]; then printf 'fake webm payload' > "$last"; fi
"#;

pub const FAILING_SCRIPT: &str = r#"
echo "Unknown encoder 'libvpx-vp9'" >&2
exit 1
"#;

/// A ten-second, 30 fps input.
pub const FFPROBE_SCRIPT: &str = r#"
cat <<'JSON'
{"streams":[{"codec_type":"video","avg_frame_rate":"30/1","duration":"10.000000"}],"format":{"duration":"10.000000"}}
JSON
"#;

pub const ENCODED_PAYLOAD: &[u8] = b"fake webm payload";

/// Harness owning the temporary directories backing an [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub root: TempDir,
}

impl TestHarness {
    /// Harness with no external tools at all.
    pub fn new() -> Self {
        Self::with_tools(|_| Vec::new())
    }

    /// Harness whose tools are produced by `tools`, given the scratch root.
    pub fn with_tools(tools: impl FnOnce(&Path) -> Vec<(&'static str, PathBuf)>) -> Self {
        let root = tempfile::tempdir().expect("failed to create temp dir");
        let config = Config {
            storage: StorageConfig {
                upload_dir: root.path().join("uploads"),
                output_dir: root.path().join("outputs"),
                ..Default::default()
            },
            ..Default::default()
        };
        let registry = ToolRegistry::with_paths(tools(root.path()));
        let ctx = AppContext::new(config, registry).expect("failed to build context");
        Self { ctx, root }
    }

    /// Serve this harness on a random local port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Start a tool-less server on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Regular (non-hidden) files in the output directory.
    pub fn outputs(&self) -> Vec<PathBuf> {
        visible_files(self.ctx.storage.output_dir())
    }

    /// Regular (non-hidden) files in the upload directory.
    pub fn uploads(&self) -> Vec<PathBuf> {
        visible_files(self.ctx.storage.upload_dir())
    }

    /// Every entry in the output directory, scratch directories included.
    pub fn output_entries(&self) -> usize {
        std::fs::read_dir(self.ctx.storage.output_dir())
            .map(|rd| rd.count())
            .unwrap_or(0)
    }
}

fn visible_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'))
        })
        .collect()
}

/// Write an executable `#!/bin/sh` script.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to chmod script");
    path
}

/// Multipart body with a `file` part and optional `settings` text.
pub fn upload_form(name: &str, bytes: Vec<u8>, settings: Option<&str>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(name.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    match settings {
        Some(s) => form.text("settings", s.to_string()),
        None => form,
    }
}

/// POST an upload and return the status and JSON body.
pub async fn submit(
    addr: SocketAddr,
    form: reqwest::multipart::Form,
) -> (reqwest::StatusCode, serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/convert"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

/// Poll progress until the job leaves `processing`; returns every body seen.
pub async fn poll_until_done(addr: SocketAddr, id: &str) -> Vec<serde_json::Value> {
    let client = reqwest::Client::new();
    let mut seen = Vec::new();
    for _ in 0..400 {
        let body: serde_json::Value = client
            .get(format!("http://{addr}/api/progress/{id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let done = body["status"] != "processing";
        seen.push(body);
        if done {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("conversion {id} did not finish; last status {:?}", seen.last());
}
