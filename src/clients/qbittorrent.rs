use crate::config::QBittorrentConfig;
use anyhow::{Context, Result, bail};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct AddTorrentOptions {
    pub save_path: Option<String>,

    pub category: Option<String>,

    pub paused: bool,
}

impl AddTorrentOptions {
    #[must_use]
    pub fn from_config(config: &QBittorrentConfig) -> Self {
        Self {
            save_path: config.save_path.clone(),
            category: (!config.category.is_empty()).then(|| sanitize_category(&config.category)),
            paused: false,
        }
    }

    fn apply(self, mut form: Form) -> Form {
        if let Some(path) = self.save_path {
            form = form.text("savepath", path);
        }
        if let Some(cat) = self.category {
            form = form.text("category", cat);
        }
        if self.paused {
            form = form.text("paused", "true");
        }
        form
    }
}

/// Session-cookie client for the qBittorrent Web API. The supplied
/// `reqwest::Client` must have its cookie store enabled.
#[derive(Debug, Clone)]
pub struct QBitClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl QBitClient {
    #[must_use]
    pub fn new(client: Client, config: &QBittorrentConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    pub async fn login(&self) -> Result<()> {
        let url = format!("{}/api/v2/auth/login", self.base_url);

        let params = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("Referer", &self.base_url)
            .form(&params)
            .send()
            .await
            .context("Failed to connect to qBittorrent")?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK && body.contains("Ok") {
            debug!("Successfully authenticated with qBittorrent");

            Ok(())
        } else if body.contains("Fails") {
            bail!("qBittorrent authentication failed: invalid credentials")
        } else {
            bail!("qBittorrent authentication failed: status={status}, body={body}")
        }
    }

    async fn ensure_auth(&self) -> Result<()> {
        let url = format!("{}/api/v2/app/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Referer", &self.base_url)
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            debug!(reason = "session_expired", "Logging in...");
            self.login().await?;
        }

        Ok(())
    }

    pub async fn get_version(&self) -> Result<String> {
        self.ensure_auth().await?;

        let url = format!("{}/api/v2/app/version", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Referer", &self.base_url)
            .send()
            .await?;

        let version = response.text().await?;
        Ok(version)
    }

    async fn submit(&self, form: Form) -> Result<()> {
        let api_url = format!("{}/api/v2/torrents/add", self.base_url);

        let response = self
            .client
            .post(&api_url)
            .header("Referer", &self.base_url)
            .multipart(form)
            .send()
            .await
            .context("Failed to add torrent")?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK && !body.contains("Fails") {
            debug!("Torrent added successfully");
            Ok(())
        } else if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
            bail!("Torrent file is not valid")
        } else {
            bail!("Failed to add torrent: status={status}, body={body}")
        }
    }

    /// Uploads a local `.torrent` file.
    pub async fn add_torrent_file(&self, path: &Path, options: AddTorrentOptions) -> Result<()> {
        self.ensure_auth().await?;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read torrent file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map_or_else(|| "release.torrent".to_string(), |n| n.to_string_lossy().into_owned());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/x-bittorrent")?;

        self.submit(options.apply(Form::new().part("torrents", part)))
            .await
    }

    pub async fn add_magnet(&self, magnet: &str, options: AddTorrentOptions) -> Result<()> {
        self.ensure_auth().await?;
        self.submit(options.apply(Form::new().text("urls", magnet.to_string())))
            .await
    }

    pub async fn is_available(&self) -> bool {
        match self.get_version().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "qBittorrent not available");
                false
            }
        }
    }
}

#[must_use]
pub fn sanitize_category(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> QBitClient {
        let http = Client::builder().cookie_store(true).build().unwrap();
        let config = QBittorrentConfig {
            url: server.uri(),
            ..QBittorrentConfig::default()
        };
        QBitClient::new(http, &config)
    }

    #[test]
    fn test_sanitize_category() {
        assert_eq!(sanitize_category("Test:Anime"), "Test_Anime");
        assert_eq!(sanitize_category("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_category("Normal Title"), "Normal Title");
    }

    #[test]
    fn test_options_from_config() {
        let config = QBittorrentConfig {
            category: "anime:tv".to_string(),
            save_path: Some("/data/anime".to_string()),
            ..QBittorrentConfig::default()
        };
        let options = AddTorrentOptions::from_config(&config);
        assert_eq!(options.category.as_deref(), Some("anime_tv"));
        assert_eq!(options.save_path.as_deref(), Some("/data/anime"));
    }

    #[tokio::test]
    async fn test_add_torrent_file_logs_in_when_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/app/version"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Ok."))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("release.torrent");
        std::fs::write(&file, b"d8:announce0:e").unwrap();

        client_for(&server)
            .add_torrent_file(&file, AddTorrentOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_torrent_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/app/version"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v4.6.0"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/torrents/add"))
            .respond_with(ResponseTemplate::new(415))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .add_magnet("magnet:?xt=urn:btih:abc", AddTorrentOptions::default())
            .await;
        assert!(result.is_err());
    }
}
