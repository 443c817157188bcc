use std::sync::{Arc, Mutex};

use anisync::clients::webhook::{EpisodeUpdate, UpdateNotifier, WebhookNotifier};
use axum::{Json, Router, extract::State, routing::post};

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

async fn spawn_webhook() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route(
            "/hook",
            post(
                |State(received): State<Received>, Json(body): Json<serde_json::Value>| async move {
                    received.lock().unwrap().push(body);
                },
            ),
        )
        .with_state(Arc::clone(&received));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), received)
}

fn update(anime: &str, n: i32, website: &str) -> EpisodeUpdate {
    EpisodeUpdate {
        anime: anime.to_string(),
        episode_number: n,
        episode_title: Some(format!("Part {n}")),
        episode_id: format!("{anime}-{n}"),
        website: website.to_string(),
    }
}

#[tokio::test]
async fn test_one_post_per_website() {
    let (url, received) = spawn_webhook().await;
    let notifier = WebhookNotifier::new(reqwest::Client::new(), url, "anisync");

    notifier
        .notify(&[
            update("Show A", 1, "Gogoanime"),
            update("Show B", 4, "9anime"),
            update("Show A", 2, "Gogoanime"),
        ])
        .await
        .unwrap();

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 2);

    assert_eq!(bodies[0]["username"], "anisync");
    assert_eq!(bodies[0]["content"], "There is an update");
    assert_eq!(bodies[0]["embeds"][0]["author"]["name"], "Provided by 9anime");

    assert_eq!(bodies[1]["content"], "There are multiple updates");
    assert_eq!(
        bodies[1]["embeds"][0]["description"],
        "Show A Episode 1 - Part 1\nShow A Episode 2 - Part 2"
    );
}

#[tokio::test]
async fn test_unreachable_webhook_is_an_error() {
    let notifier = WebhookNotifier::new(reqwest::Client::new(), "http://127.0.0.1:9/hook", "anisync");
    assert!(notifier.notify(&[update("Show", 1, "Gogoanime")]).await.is_err());
}
