#![cfg(feature = "web")]
//! Integration tests for the AI fallback and its monthly quota.

mod common;

use common::{numbered_csv, TestApp};
use datachat::db;
use mockito::{Matcher, Server};

const ANSWER: &str = r#"{"choices":[{"message":{"role":"assistant","content":"Scores rise steadily."}}]}"#;

async fn app_with_ai(server: &Server) -> TestApp {
    let url = server.url();
    TestApp::with_config(|config| {
        config.openai_api_key = Some("sk-test".to_string());
        config.ai_api_base = url;
        config.ai_model = "test-model".to_string();
    })
    .await
}

async fn user_id(app: &TestApp, username: &str) -> i64 {
    db::find_user_by_username(&app.state.db, username)
        .await
        .unwrap()
        .unwrap()
        .id
}

#[tokio::test]
async fn questions_below_quota_reach_the_service() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("test-model".to_string()),
            Matcher::Regex("row4".to_string()),
            Matcher::Regex("what is the trend".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ANSWER)
        .expect(1)
        .create_async()
        .await;

    let app = app_with_ai(&server).await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(20)).await;

    let reply = app.chat(&ann, "what is the trend").await;
    assert_eq!(reply["response"], "Scores rise steadily.");
    mock.assert_async().await;

    let id = user_id(&app, "ann").await;
    let used = db::ai_queries_used(&app.state.db, id, &db::current_month())
        .await
        .unwrap();
    assert_eq!(used, 1);
}

#[tokio::test]
async fn only_the_first_five_rows_are_shared() {
    let mut server = Server::new_async().await;
    // row4 directly followed by the question means row5 and later were left out
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r"\(CSV\):\\n\\nid,name,score\\n0,row0,0\.5\\n".to_string()),
            Matcher::Regex(r"4,row4,4\.5\\n\\n\\nQuestion: any outliers\?".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ANSWER)
        .expect(1)
        .create_async()
        .await;

    let app = app_with_ai(&server).await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(20)).await;

    let reply = app.chat(&ann, "any outliers?").await;
    assert_eq!(reply["response"], "Scores rise steadily.");
    mock.assert_async().await;
}

#[tokio::test]
async fn quota_blocks_further_questions() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(ANSWER)
        .expect(0)
        .create_async()
        .await;

    let app = app_with_ai(&server).await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(3)).await;

    let id = user_id(&app, "ann").await;
    let month = db::current_month();
    for _ in 0..app.state.config.ai_monthly_quota {
        db::record_ai_query(&app.state.db, id, &month).await.unwrap();
    }

    let reply = app.chat(&ann, "what is the trend").await;
    assert_eq!(
        reply["response"],
        "You have reached your monthly limit of 10 AI queries."
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn questions_need_a_dataset() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let app = app_with_ai(&server).await;
    let ann = app.user("ann").await;

    let reply = app.chat(&ann, "anything interesting?").await;
    assert_eq!(reply["response"], "Please upload and select a data file first.");
    mock.assert_async().await;
}

#[tokio::test]
async fn service_errors_are_not_counted() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let app = app_with_ai(&server).await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(3)).await;

    let reply = app.chat(&ann, "what is the trend").await;
    let text = reply["response"].as_str().unwrap();
    assert!(text.starts_with("AI service error:"), "{}", text);
    assert!(text.contains("503"));

    let id = user_id(&app, "ann").await;
    let used = db::ai_queries_used(&app.state.db, id, &db::current_month())
        .await
        .unwrap();
    assert_eq!(used, 0);
}

#[tokio::test]
async fn data_commands_never_call_the_service() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let app = app_with_ai(&server).await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(3)).await;

    app.chat(&ann, "show head").await;
    app.chat(&ann, "describe data").await;
    mock.assert_async().await;
}
