#![cfg(feature = "web")]
//! Integration tests for the chat command endpoint.

mod common;

use common::{numbered_csv, TestApp};
use datachat::commands::{INVALID_PAGE_MESSAGE, NO_CACHE_MESSAGE, NO_FILES_MESSAGE, NO_NUMERIC_MESSAGE};
use serde_json::json;

#[tokio::test]
async fn commands_need_an_uploaded_file() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;

    let reply = app.chat(&ann, "show head").await;
    assert_eq!(reply, json!({ "response": NO_FILES_MESSAGE }));
}

#[tokio::test]
async fn unmatched_messages_are_echoed_without_ai() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;

    let reply = app.chat(&ann, "what is the best month?").await;
    assert_eq!(reply["response"], "You said: what is the best month?");
}

#[tokio::test]
async fn small_head_and_shape() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(8)).await;
    app.select(&ann, "scores.csv").await;

    let reply = app.chat(&ann, "  Show Head ").await;
    let html = reply["response"].as_str().unwrap();
    assert!(html.starts_with("<table border=\"0\" class=\"dataframe data-table\">"));
    assert!(html.contains("<td>row4</td>"));
    assert!(!html.contains("<td>row5</td>"));
    assert!(reply.get("pagination").is_none());

    let reply = app.chat(&ann, "show shape").await;
    let html = reply["response"].as_str().unwrap();
    assert!(html.contains("<th>rows</th>"));
    assert!(html.contains("<td>8</td>"));
    assert!(html.contains("<td>3</td>"));
}

#[tokio::test]
async fn large_head_is_paginated() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "big.csv", &numbered_csv(75)).await;

    let reply = app.chat(&ann, "show head").await;
    assert_eq!(
        reply["pagination"],
        json!({ "total_pages": 2, "current_page": 1, "page_size": 50, "total_rows": 75 })
    );

    let reply = app.chat(&ann, "show page 2").await;
    assert_eq!(reply["pagination"]["current_page"], 2);
    assert!(reply["response"].as_str().unwrap().contains("<td>row74</td>"));
}

#[tokio::test]
async fn page_numbers_are_clamped() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "big.csv", &numbered_csv(120)).await;

    let reply = app.chat(&ann, "show all data").await;
    assert_eq!(reply["pagination"]["total_pages"], 3);
    assert_eq!(reply["pagination"]["current_page"], 1);

    let reply = app.chat(&ann, "show page 0").await;
    assert_eq!(reply["pagination"]["current_page"], 1);
    assert!(reply["response"].as_str().unwrap().contains("<td>row0</td>"));

    let reply = app.chat(&ann, "show page 99").await;
    assert_eq!(reply["pagination"]["current_page"], 3);
    assert!(reply["response"].as_str().unwrap().contains("<td>row119</td>"));

    let reply = app.chat(&ann, "show page next").await;
    assert_eq!(reply, json!({ "response": INVALID_PAGE_MESSAGE }));
}

#[tokio::test]
async fn pages_need_a_cached_dataset() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;

    let reply = app.chat(&ann, "show page 1").await;
    assert_eq!(reply["response"], NO_CACHE_MESSAGE);

    app.upload(&ann, "big.csv", &numbered_csv(60)).await;
    app.chat(&ann, "show all data").await;

    // Another session of the same user has its own cache
    let second = app.login("ann", "secret").await.unwrap();
    let reply = app.chat(&second, "show page 2").await;
    assert_eq!(reply["response"], NO_CACHE_MESSAGE);

    // Selecting a file drops the session's cached dataset
    app.select(&ann, "big.csv").await;
    let reply = app.chat(&ann, "show page 2").await;
    assert_eq!(reply["response"], NO_CACHE_MESSAGE);
}

#[tokio::test]
async fn averages_skip_text_columns() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "mixed.csv", "name,x,y\na,1,2.5\nb,3,\n").await;

    let reply = app.chat(&ann, "show me the average").await;
    assert_eq!(reply["averages"], json!({ "x": 2.0, "y": 2.5 }));
    assert!(reply["response"].as_str().unwrap().contains("<th>mean</th>"));

    app.upload(&ann, "names.csv", "name\na\nb\n").await;
    let reply = app.chat(&ann, "show me the average").await;
    assert_eq!(reply, json!({ "response": NO_NUMERIC_MESSAGE }));
}

#[tokio::test]
async fn describe_includes_every_column() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(4)).await;

    let reply = app.chat(&ann, "describe data").await;
    let html = reply["response"].as_str().unwrap();
    for label in ["count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%", "max"] {
        assert!(html.contains(&format!("<th>{}</th>", label)), "missing {}", label);
    }
}

#[tokio::test]
async fn latest_upload_is_used_until_a_file_is_selected() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "tall.csv", "x\n1\n2\n3\n").await;
    app.upload(&ann, "wide.csv", "x,y,z,w\n1,2,3,4\n").await;

    let reply = app.chat(&ann, "show shape").await;
    assert!(reply["response"].as_str().unwrap().contains("<td>4</td>"));

    app.select(&ann, "tall.csv").await;
    let reply = app.chat(&ann, "show shape").await;
    let html = reply["response"].as_str().unwrap();
    assert!(html.contains("<td>3</td>"));
    assert!(!html.contains("<td>4</td>"));
}

#[tokio::test]
async fn unreadable_files_are_reported_in_the_reply() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "broken.csv", "a,b\n1,2,3\n").await;

    let reply = app.chat(&ann, "show head").await;
    assert!(reply["response"]
        .as_str()
        .unwrap()
        .starts_with("Failed to read the uploaded file:"));
}

#[tokio::test]
async fn histogram_explains_bad_columns() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(4)).await;

    let reply = app.chat(&ann, "plot histogram height").await;
    assert_eq!(
        reply["response"],
        "Column 'height' not found. Available columns: id, name, score"
    );

    let reply = app.chat(&ann, "show histogram of NAME").await;
    assert!(reply["response"].as_str().unwrap().contains("is not numeric"));
    assert!(reply.get("image").is_none());
}

#[tokio::test]
async fn histogram_is_returned_as_png() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "scores.csv", &numbered_csv(30)).await;

    let reply = app.chat(&ann, "plot histogram score").await;
    let image = reply["image"].as_str().unwrap();
    assert!(image.starts_with("data:image/png;base64,"));
    let response = reply["response"].as_str().unwrap();
    assert!(response.starts_with("<img"));
    assert!(response.contains(image));
}

#[tokio::test]
async fn huge_page_numbers_show_the_last_page() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;
    app.upload(&ann, "big.csv", &numbered_csv(120)).await;
    app.chat(&ann, "show all data").await;

    let reply = app.chat(&ann, "show page 99999999999999999999").await;
    assert_eq!(reply["pagination"]["current_page"], 3);
    assert!(reply["response"].as_str().unwrap().contains("row119"));
}

#[tokio::test]
async fn chat_accepts_form_bodies() {
    let app = TestApp::new().await;
    let ann = app.user("ann").await;

    let (_, reply) = app.post_form("/chat", &ann, "message=hi").await;
    assert_eq!(reply["response"], "You said: hi");
}
