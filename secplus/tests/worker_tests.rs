use tempfile::{tempdir, TempDir};

use secplus::offline::{
    Destination, Method, Outcome, Request, Worker, WorkerState, APP_CACHE_NAME, ESSENTIAL_ASSETS,
    OFFLINE_PATH,
};
use secplus::testing::{page, ScriptedFetch};
use secplus_auth::bridge::BRIDGE_CACHE_NAME;
use secplus_auth::store::{CacheEntry, CacheSet, AUTH_CACHE_NAME};

const ORIGIN: &str = "https://app.example";

struct Rig {
    _dir: TempDir,
    caches: CacheSet,
    worker: Worker<ScriptedFetch>,
}

fn rig() -> Rig {
    let dir = tempdir().unwrap();
    let caches = CacheSet::open(dir.path().join("caches"));
    let worker = Worker::new(caches.clone(), ScriptedFetch::new(), ORIGIN).unwrap();
    Rig {
        _dir: dir,
        caches,
        worker,
    }
}

fn fetcher(worker: &Worker<ScriptedFetch>) -> &ScriptedFetch {
    // The rig hands the fetcher to the worker; reach it through here.
    worker.fetcher()
}

fn stage_essentials(fetch: &ScriptedFetch) {
    for path in ESSENTIAL_ASSETS {
        fetch.respond(&format!("{ORIGIN}{path}"), page(path));
    }
}

async fn installed_rig() -> Rig {
    let mut rig = rig();
    stage_essentials(fetcher(&rig.worker));
    rig.worker.install().await.unwrap();
    rig.worker.activate().await.unwrap();
    rig
}

fn body_of(outcome: &Outcome) -> String {
    String::from_utf8(outcome.response().expect("expected a response").body.clone()).unwrap()
}

#[tokio::test]
async fn install_precaches_every_essential_asset() {
    let mut rig = rig();
    assert_eq!(rig.worker.state(), WorkerState::Installing);

    stage_essentials(fetcher(&rig.worker));
    rig.worker.install().await.unwrap();
    assert_eq!(rig.worker.state(), WorkerState::Waiting);

    let shell = rig.caches.cache(APP_CACHE_NAME);
    for path in ESSENTIAL_ASSETS {
        let cached = shell.get(path).unwrap();
        assert!(cached.is_some(), "{path} should be precached");
    }
}

#[tokio::test]
async fn install_is_all_or_nothing() {
    let mut rig = rig();
    let fetch = fetcher(&rig.worker);
    for path in &ESSENTIAL_ASSETS[..ESSENTIAL_ASSETS.len() - 1] {
        fetch.respond(&format!("{ORIGIN}{path}"), page(path));
    }
    // The last asset is unreachable.

    assert!(rig.worker.install().await.is_err());
    assert_eq!(rig.worker.state(), WorkerState::Installing);

    let shell = rig.caches.cache(APP_CACHE_NAME);
    assert_eq!(shell.get("/").unwrap(), None, "nothing cached after a failed install");
}

#[tokio::test]
async fn install_rejects_error_statuses() {
    let mut rig = rig();
    let fetch = fetcher(&rig.worker);
    let icon_url = format!("{ORIGIN}/icons/icon-512.png");
    for path in ESSENTIAL_ASSETS {
        let url = format!("{ORIGIN}{path}");
        if url == icon_url {
            fetch.respond(
                &url,
                CacheEntry {
                    status: 500,
                    content_type: None,
                    body: Vec::new(),
                },
            );
        } else {
            fetch.respond(&url, page(path));
        }
    }

    assert!(rig.worker.install().await.is_err());
    assert_eq!(rig.caches.cache(APP_CACHE_NAME).get("/").unwrap(), None);
}

#[tokio::test]
async fn activate_sweeps_stale_caches_but_spares_cooperators() {
    let mut rig = installed_rig().await;

    let entry = CacheEntry::json(b"{}".to_vec());
    rig.caches.cache("sp-cache-v2").put("/", &entry).unwrap();
    rig.caches.cache(AUTH_CACHE_NAME).put("sp_session", &entry).unwrap();
    rig.caches.cache(BRIDGE_CACHE_NAME).put("/install-code", &entry).unwrap();

    rig.worker.activate().await.unwrap();
    assert_eq!(rig.worker.state(), WorkerState::Active);

    let names = rig.caches.names().unwrap();
    assert!(!names.contains(&"sp-cache-v2".to_string()), "stale version swept");
    assert!(names.contains(&APP_CACHE_NAME.to_string()));
    assert!(names.contains(&AUTH_CACHE_NAME.to_string()));
    assert!(names.contains(&BRIDGE_CACHE_NAME.to_string()));
}

#[tokio::test]
async fn navigation_prefers_network_and_caches_the_response() {
    let rig = installed_rig().await;
    let url = format!("{ORIGIN}/agenda");
    fetcher(&rig.worker).respond(&url, page("agenda fresh"));

    let outcome = rig.worker.handle(&Request::navigation(url.as_str())).await;
    assert_eq!(body_of(&outcome), "agenda fresh");

    // Network gone now; the cached copy serves the repeat visit.
    let offline = rig.worker.handle(&Request::navigation(url.as_str())).await;
    assert_eq!(body_of(&offline), "agenda fresh");
}

#[tokio::test]
async fn offline_navigation_without_a_cached_page_gets_the_fallback() {
    let rig = installed_rig().await;

    let outcome = rig
        .worker
        .handle(&Request::navigation(format!("{ORIGIN}/never-visited")))
        .await;
    assert_eq!(body_of(&outcome), OFFLINE_PATH);
}

#[tokio::test]
async fn cached_start_page_serves_offline() {
    // Essential assets cached, network dead: a navigation to the start
    // URL still renders.
    let rig = installed_rig().await;

    let outcome = rig
        .worker
        .handle(&Request::navigation(format!("{ORIGIN}/")))
        .await;
    assert_eq!(body_of(&outcome), "/");
}

#[tokio::test]
async fn images_are_cache_first() {
    let rig = installed_rig().await;
    let url = format!("{ORIGIN}/photos/avatar.png");
    fetcher(&rig.worker).respond(
        &url,
        CacheEntry {
            status: 200,
            content_type: Some("image/png".to_string()),
            body: vec![1, 2, 3],
        },
    );

    let first = rig.worker.handle(&Request::get(url.as_str(), Destination::Image)).await;
    assert_eq!(first.response().unwrap().body, vec![1, 2, 3]);

    let second = rig.worker.handle(&Request::get(url.as_str(), Destination::Image)).await;
    assert_eq!(second.response().unwrap().body, vec![1, 2, 3]);
    assert_eq!(
        fetcher(&rig.worker).call_count(&url),
        1,
        "second request must come from cache"
    );
}

#[tokio::test]
async fn missing_image_degrades_to_an_empty_404() {
    let rig = installed_rig().await;

    let outcome = rig
        .worker
        .handle(&Request::get(format!("{ORIGIN}/photos/gone.png"), Destination::Image))
        .await;
    let resp = outcome.response().unwrap();
    assert_eq!(resp.status, 404);
    assert!(resp.body.is_empty());
}

#[tokio::test]
async fn scripts_and_styles_are_cache_first() {
    let rig = installed_rig().await;
    let url = format!("{ORIGIN}/assets/index-abc123.js");
    fetcher(&rig.worker).respond(
        &url,
        CacheEntry {
            status: 200,
            content_type: Some("text/javascript".to_string()),
            body: b"console.log(1)".to_vec(),
        },
    );

    rig.worker.handle(&Request::get(url.as_str(), Destination::Script)).await;
    let cached = rig.worker.handle(&Request::get(url.as_str(), Destination::Script)).await;
    assert_eq!(cached.response().unwrap().body, b"console.log(1)".to_vec());
    assert_eq!(fetcher(&rig.worker).call_count(&url), 1);
}

#[tokio::test]
async fn non_get_requests_pass_through() {
    let rig = installed_rig().await;

    let request = Request {
        url: format!("{ORIGIN}/rest/v1/user_push_subscriptions"),
        method: Method::Post,
        destination: Destination::Other,
    };
    assert_eq!(rig.worker.handle(&request).await, Outcome::PassThrough);
}

#[tokio::test]
async fn push_vendor_requests_pass_through() {
    let rig = installed_rig().await;

    let request = Request::get(
        "https://cdn.onesignal.com/sdks/web/v16/OneSignalSDK.page.js",
        Destination::Script,
    );
    assert_eq!(rig.worker.handle(&request).await, Outcome::PassThrough);
    assert!(fetcher(&rig.worker).calls().iter().all(|u| !u.contains("onesignal")));
}
