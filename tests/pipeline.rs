mod common;

use axum::{routing::get, Router};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use common::{article_page, prose, serve, summarizer, FakeLlm};
use url_summarizer::chunker::TokenBudget;
use url_summarizer::error::{AppError, FetchError};
use url_summarizer::pipeline::Summarizer;

fn html_route(path: &str, html: String) -> Router {
    Router::new().route(
        path,
        get(move || {
            let html = html.clone();
            async move { ([("content-type", "text/html; charset=utf-8")], html) }
        }),
    )
}

#[tokio::test]
async fn short_page_needs_a_single_llm_call() {
    let llm = FakeLlm::default();
    let llm_addr = llm.start().await;
    let page = serve(html_route("/post", article_page(&[prose(500, "w")]))).await;

    let result = summarizer(llm_addr, TokenBudget::default(), None)
        .summarize(&format!("http://{}/post", page))
        .await
        .unwrap();

    assert_eq!(llm.calls(), 1);
    assert_eq!(result.chunk_count, 1);
    assert!(!result.unreduced);
    assert_eq!(result.markdown_text, "## Summary 0\n\n- point");
    assert!(llm.user_input(0).starts_with("w0 w1 w2"));
    assert!(!llm.user_input(0).contains("Home | About"));
    assert!(llm.system_prompt(0).contains(&format!("http://{}/post", page)));
}

#[tokio::test]
async fn long_page_is_mapped_per_chunk_then_reduced_once() {
    let llm = FakeLlm::default();
    let llm_addr = llm.start().await;
    let paragraphs: Vec<String> = (0..4).map(|i| prose(250, &format!("p{}x", i))).collect();
    let page = serve(html_route("/long", article_page(&paragraphs))).await;
    // Room for one paragraph per call, never two.
    let budget = TokenBudget {
        max_tokens_per_call: 2000,
        reserved_tokens: 1500,
        chars_per_token: 4,
    };

    let result = summarizer(llm_addr, budget, None)
        .summarize(&format!("http://{}/long", page))
        .await
        .unwrap();

    assert_eq!(result.chunk_count, 4);
    assert_eq!(llm.calls(), 5);
    for i in 0..4 {
        assert!(llm.user_input(i).starts_with(&format!("p{}x0 ", i)), "chunk {} out of order", i);
        assert!(llm.system_prompt(i).contains(&format!("part {} of 4", i + 1)));
    }
    assert!(llm.system_prompt(4).contains("merge partial summaries"));
    assert_eq!(
        llm.user_input(4),
        "## Summary 0\n\n- point\n\n---\n\n## Summary 1\n\n- point\n\n---\n\n## Summary 2\n\n- point\n\n---\n\n## Summary 3\n\n- point"
    );
    assert_eq!(result.markdown_text, "## Summary 4\n\n- point");
    assert!(!result.unreduced);
}

#[tokio::test]
async fn youtube_video_without_transcript_makes_no_llm_call() {
    let llm = FakeLlm::default();
    let llm_addr = llm.start().await;
    let youtube = serve(html_route(
        "/watch",
        "<html><script>var ytInitialPlayerResponse = {\"playabilityStatus\":{\"status\":\"OK\"}};</script></html>"
            .to_string(),
    ))
    .await;

    let err = summarizer(llm_addr, TokenBudget::default(), Some(youtube))
        .summarize("https://youtube.com/watch?v=abc123")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Fetch(FetchError::NoTranscriptAvailable(ref id)) if id == "abc123"));
    assert!(err.to_string().contains("No transcript available"));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn youtube_transcript_is_summarized_in_time_order() {
    let llm = FakeLlm::default();
    let llm_addr = llm.start().await;
    let watch = r#"<html><script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsRenderer":{"captionTracks":[
        {"baseUrl":"/api/timedtext?v=dQw4w9WgXcQ&lang=de","languageCode":"de"},
        {"baseUrl":"/api/timedtext?v=dQw4w9WgXcQ&lang=en","languageCode":"en"}
    ]}}};</script></html>"#;
    let timed_text = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
        <text start="0.0" dur="2.5">Welcome back to the channel</text>
        <text start="2.5" dur="3.0">today we talk about Rust &amp;amp; async</text>
    </transcript>"#;
    let app = Router::new()
        .route("/watch", get(move || async move { ([("content-type", "text/html")], watch) }))
        .route(
            "/api/timedtext",
            get(move || async move { ([("content-type", "text/xml")], timed_text) }),
        );
    let youtube = serve(app).await;

    let result = summarizer(llm_addr, TokenBudget::default(), Some(youtube))
        .summarize("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await
        .unwrap();

    assert_eq!(llm.calls(), 1);
    assert_eq!(result.chunk_count, 1);
    assert_eq!(
        llm.user_input(0),
        "Welcome back to the channel\ntoday we talk about Rust & async"
    );
    assert!(llm.system_prompt(0).contains("transcript"));
}

#[tokio::test]
async fn streamed_oversized_body_is_rejected() {
    let llm = FakeLlm::default();
    let llm_addr = llm.start().await;

    // Chunked response without Content-Length, so the cap has to trip mid-stream.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ntransfer-encoding: chunked\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                let piece = "<p>".to_string() + &"a".repeat(1000) + "</p>";
                for _ in 0..50 {
                    let frame = format!("{:x}\r\n{}\r\n", piece.len(), piece);
                    if socket.write_all(frame.as_bytes()).await.is_err() {
                        return;
                    }
                }
                let _ = socket.write_all(b"0\r\n\r\n").await;
            });
        }
    });

    let s = Summarizer::new(common::fetcher(4096, None), common::llm_client(llm_addr, TokenBudget::default()));
    let err = s.summarize(&format!("http://{}/stream", addr)).await.unwrap_err();

    assert!(matches!(err, AppError::Fetch(FetchError::TooLarge { limit: 4096 })));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn empty_page_fails_without_llm_call() {
    let llm = FakeLlm::default();
    let llm_addr = llm.start().await;
    let page = serve(html_route(
        "/empty",
        "<html><body><nav>Menu</nav><script>app()</script></body></html>".to_string(),
    ))
    .await;

    let err = summarizer(llm_addr, TokenBudget::default(), None)
        .summarize(&format!("http://{}/empty", page))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Extract(_)));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn slow_source_hits_the_overall_deadline() {
    let llm = FakeLlm::default();
    let llm_addr = llm.start().await;
    let app = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            ([("content-type", "text/html")], "<p>late</p>")
        }),
    );
    let page = serve(app).await;

    let err = summarizer(llm_addr, TokenBudget::default(), None)
        .with_deadline(Duration::from_millis(200))
        .summarize(&format!("http://{}/slow", page))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::DeadlineExceeded(_)));
    assert_eq!(llm.calls(), 0);
}
