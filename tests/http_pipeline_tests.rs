use anisync::config::{Config, DownloadClientKind, LibraryProviderKind};
use anisync::context::Context;
use anisync::db::Store;
use anisync::models::ListStatus;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn item(base: &str, id: u32, title: &str) -> String {
    format!(
        "<item>
  <title>{title}</title>
  <link>{base}/download/{id}.torrent</link>
  <guid isPermaLink=\"true\">{base}/view/{id}</guid>
  <nyaa:seeders>100</nyaa:seeders>
  <nyaa:leechers>3</nyaa:leechers>
  <nyaa:downloads>900</nyaa:downloads>
  <nyaa:infoHash>f1d2e3c4b5a6f1d2e3c4b5a6f1d2e3c4b5a6f{id:03}</nyaa:infoHash>
  <nyaa:size>1.4 GiB</nyaa:size>
</item>"
    )
}

fn feed(items: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<rss xmlns:nyaa=\"https://nyaa.si/xmlns/nyaa\" version=\"2.0\">
<channel>
{}
</channel>
</rss>",
        items.join("\n")
    )
}

fn watch_list() -> serde_json::Value {
    json!({
        "data": {
            "MediaListCollection": {
                "lists": [{ "name": "Watching", "entries": [{
                    "id": 11, "mediaId": 154587, "status": "CURRENT", "score": 9.0,
                    "progress": 5, "priority": 0, "private": false,
                    "hiddenFromStatusLists": false,
                    "media": {
                        "id": 154587,
                        "title": { "romaji": "Sousou no Frieren", "english": "Frieren: Beyond Journey's End",
                                   "native": null, "userPreferred": "Sousou no Frieren" },
                        "synonyms": [],
                        "format": "TV",
                        "status": "FINISHED",
                        "episodes": 28,
                        "seasonYear": 2023,
                        "nextAiringEpisode": null
                    }
                }]}]
            }
        }
    })
}

async fn mount_services(server: &MockServer) {
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(watch_list()))
        .mount(server)
        .await;

    let first_page = feed(&[
        item(&base, 5, "[SubsPlease] Sousou no Frieren - 05 (1080p) [AAAA0005].mkv"),
        item(&base, 6, "[SubsPlease] Sousou no Frieren - 06 (1080p) [AAAA0006].mkv"),
        item(&base, 60, "[Erai-raws] Sousou no Frieren - 06 [1080p][Multiple Subtitle]"),
    ]);
    let second_page = feed(&[item(
        &base,
        7,
        "[SubsPlease] Sousou no Frieren - 07 (1080p) [AAAA0007].mkv",
    )]);

    for (page, body) in [("1", first_page), ("2", second_page), ("3", feed(&[]))] {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("page", "rss"))
            .and(query_param("p", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    // Episode 6 fails once before the transfer succeeds.
    Mock::given(method("GET"))
        .and(path("/download/6.torrent"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(server)
        .await;
    for id in [6, 7] {
        Mock::given(method("GET"))
            .and(path(format!("/download/{id}.torrent")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"d8:announce0:e".to_vec()))
            .mount(server)
            .await;
    }
}

fn config_for(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.anilist.api_url = format!("{}/graphql", server.uri());
    config.anilist.username = "frieren_fan".to_string();
    config.nyaa.base_url = server.uri();
    config.nyaa.request_delay_ms = 0;
    config.library.provider = LibraryProviderKind::None;
    config.downloads.torrent_directory = dir.path().join("torrents").display().to_string();
    config.downloads.client = DownloadClientKind::WatchFolder;
    config.downloads.watch_directory = dir.path().join("watch").display().to_string();
    config.downloads.retry.base_delay_ms = 1;
    config.downloads.retry.max_delay_ms = 1;
    config.downloads.retry.jitter_ms = 0;
    config
}

#[tokio::test]
async fn test_pass_over_http_services() {
    let server = MockServer::start().await;
    mount_services(&server).await;
    let dir = TempDir::new().unwrap();

    let config = config_for(&server, &dir);
    config.validate().unwrap();
    let store = Store::in_memory().await.unwrap();
    let context = Context::with_store(config, store.clone()).unwrap();

    let summary = context
        .reconcile_service(false)
        .run(ListStatus::Current)
        .await
        .unwrap();

    assert_eq!(summary.candidates, 4);
    assert_eq!(summary.admitted, 2);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.queued, 2);
    assert_eq!(summary.failed, 0);

    let watched: Vec<String> = std::fs::read_dir(dir.path().join("watch"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(watched.len(), 2);
    assert!(watched.iter().all(|name| name.ends_with(".torrent")));

    let episode_six_requests = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/download/6.torrent")
        .count();
    assert_eq!(episode_six_requests, 2);

    let record = store
        .get("[SubsPlease] Sousou no Frieren - 06 (1080p) [AAAA0006].mkv")
        .await
        .unwrap()
        .unwrap();
    assert!(record.queued);
    assert_eq!(record.url, format!("{}/download/6.torrent", server.uri()));
}

#[tokio::test]
async fn test_dry_run_over_http_services() {
    let server = MockServer::start().await;
    mount_services(&server).await;
    let dir = TempDir::new().unwrap();

    let store = Store::in_memory().await.unwrap();
    let context = Context::with_store(config_for(&server, &dir), store.clone()).unwrap();

    let summary = context
        .reconcile_service(true)
        .run(ListStatus::Current)
        .await
        .unwrap();

    assert_eq!(summary.admitted, 2);
    assert_eq!(summary.fetched, 0);
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(!dir.path().join("torrents").exists());

    let downloads = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().starts_with("/download/"))
        .count();
    assert_eq!(downloads, 0);
}

#[tokio::test]
async fn test_unconfigured_watch_list_fails_the_pass() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let store = Store::in_memory().await.unwrap();
    let mut config = config_for(&server, &dir);
    config.anilist.username = String::new();
    let context = Context::with_store(config, store).unwrap();

    let error = context
        .reconcile_service(false)
        .run(ListStatus::Current)
        .await
        .unwrap_err();
    assert!(error.to_string().contains("username"));
    assert!(server.received_requests().await.unwrap().is_empty());
}
