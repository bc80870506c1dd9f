mod common;

use std::sync::Arc;
use std::time::Duration;

use common::connect;
use pw_runtime::{ConnectionOptions, JsValue, ObjectType, ResponseMode};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_goto_resolves_response_created_before_reply() {
	let (connection, mut driver) = connect();

	driver.create("", "Page", "page@1", json!({ "mainFrame": { "guid": "frame@1" } })).await;
	let page = connection.wait_for_object("page@1", WAIT).await.unwrap();

	let goto = {
		let page = Arc::clone(&page);
		tokio::spawn(async move {
			page.channel()
				.send_resolved("goto", json!({ "url": "https://example.com" }))
				.await
		})
	};

	let request = driver.next_request().await;
	assert_eq!(request["id"], 1);
	assert_eq!(request["guid"], "page@1");
	assert_eq!(request["method"], "goto");
	assert_eq!(request["params"]["url"], "https://example.com");

	driver
		.create("page@1", "Response", "response@1", json!({ "status": 200, "url": "https://example.com/" }))
		.await;
	driver.respond(1, json!({ "response": { "guid": "response@1" } })).await;

	let result = goto.await.unwrap().unwrap();
	let response = result.get("response").unwrap();
	let response = response.as_handle().unwrap();
	assert_eq!(response.guid(), "response@1");
	assert_eq!(response.object_type(), &ObjectType::Response);
	assert_eq!(response.initializer()["status"], 200);
	assert!(Arc::ptr_eq(&response.parent().unwrap(), &page));
}

#[tokio::test]
async fn test_goto_waits_for_response_created_after_reply() {
	let (connection, mut driver) = connect();

	driver.create("", "Page", "page@1", json!({})).await;
	let page = connection.wait_for_object("page@1", WAIT).await.unwrap();

	let goto = {
		let page = Arc::clone(&page);
		tokio::spawn(async move { page.channel().send_resolved("goto", json!({})).await })
	};
	driver.next_request().await;

	driver.respond(1, json!({ "response": { "guid": "response@1" } })).await;
	driver.create("page@1", "Response", "response@1", json!({ "status": 204 })).await;

	let result = goto.await.unwrap().unwrap();
	let response = result.get("response").and_then(|r| r.as_handle().cloned()).unwrap();
	assert_eq!(response.initializer()["status"], 204);
}

#[tokio::test]
async fn test_null_response_stays_null() {
	let (connection, mut driver) = connect();

	driver.create("", "Page", "page@1", json!({})).await;
	let page = connection.wait_for_object("page@1", WAIT).await.unwrap();

	let goto = {
		let page = Arc::clone(&page);
		tokio::spawn(async move { page.channel().send_resolved("goto", json!({})).await })
	};
	driver.next_request().await;
	driver.respond(1, json!({ "response": null })).await;

	let result = goto.await.unwrap().unwrap();
	assert_eq!(result.get("response"), Some(JsValue::Null));
}

#[tokio::test]
async fn test_reply_for_missing_object_times_out() {
	let options = ConnectionOptions::default().object_wait_timeout(Duration::from_millis(50));
	let (connection, mut driver) = common::connect_with(options);

	driver.create("", "Page", "page@1", json!({})).await;
	let page = connection.wait_for_object("page@1", WAIT).await.unwrap();

	let goto = {
		let page = Arc::clone(&page);
		tokio::spawn(async move { page.channel().send_resolved("goto", json!({})).await })
	};
	driver.next_request().await;
	driver.respond(1, json!({ "response": { "guid": "response@9" } })).await;

	let err = goto.await.unwrap().unwrap_err();
	assert!(err.is_timeout(), "got {err:?}");
	assert!(err.to_string().contains("response@9"));
}

#[tokio::test]
async fn test_responses_out_of_order() {
	let (connection, mut driver) = connect();

	// Burn ids 1 through 6 so the interesting pair is 7 and 8.
	for id in 1..=6u64 {
		let call = {
			let connection = Arc::clone(&connection);
			tokio::spawn(async move {
				connection
					.send_message("", "ping", json!({}), ResponseMode::Envelope)
					.await
			})
		};
		assert_eq!(driver.next_request().await["id"], id);
		driver.respond(id, json!({})).await;
		call.await.unwrap().unwrap();
	}

	let seven = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move {
			connection
				.send_message("page@1", "title", json!({}), ResponseMode::Envelope)
				.await
		})
	};
	assert_eq!(driver.next_request().await["id"], 7);
	let eight = {
		let connection = Arc::clone(&connection);
		tokio::spawn(async move {
			connection
				.send_message("page@1", "url", json!({}), ResponseMode::Envelope)
				.await
		})
	};
	assert_eq!(driver.next_request().await["id"], 8);

	driver.respond(8, json!({ "value": "https://example.com/" })).await;
	driver.respond(7, json!({ "value": "Example Domain" })).await;

	assert_eq!(seven.await.unwrap().unwrap()["value"], "Example Domain");
	assert_eq!(eight.await.unwrap().unwrap()["value"], "https://example.com/");
}

#[tokio::test]
async fn test_concurrent_ids_are_unique_and_ordered_on_the_wire() {
	let (connection, mut driver) = connect();

	let calls: Vec<_> = (0..32)
		.map(|n| {
			let connection = Arc::clone(&connection);
			tokio::spawn(async move {
				connection
					.send_message("page@1", "evaluate", json!({ "n": n }), ResponseMode::Envelope)
					.await
			})
		})
		.collect();

	let mut ids = Vec::new();
	for _ in 0..32 {
		let request = driver.next_request().await;
		ids.push(request["id"].as_u64().unwrap());
	}
	let mut sorted = ids.clone();
	sorted.sort_unstable();
	sorted.dedup();
	assert_eq!(sorted, (1..=32).collect::<Vec<_>>());

	for id in ids {
		driver.respond(id, json!({ "id": id })).await;
	}
	for call in calls {
		call.await.unwrap().unwrap();
	}
	assert_eq!(connection.pending_count(), 0);
}

#[tokio::test]
async fn test_ownership_cascade() {
	let (connection, mut driver) = connect();

	driver.create("", "Browser", "browser@1", json!({})).await;
	driver.create("browser@1", "BrowserContext", "context@1", json!({})).await;
	driver.create("context@1", "Page", "page@1", json!({})).await;
	driver.create("page@1", "Frame", "frame@1", json!({})).await;
	driver.create("context@1", "Page", "page@2", json!({})).await;
	driver.create("", "Browser", "browser@2", json!({})).await;
	let frame = connection.wait_for_object("frame@1", WAIT).await.unwrap();
	connection.wait_for_object("browser@2", WAIT).await.unwrap();

	let context = connection.get_object("context@1").unwrap();
	let guids: Vec<_> = context.children().iter().map(|c| c.guid().to_string()).collect();
	assert_eq!(guids, ["page@1", "page@2"]);

	driver.dispose("context@1").await;
	driver.create("", "Browser", "browser@3", json!({})).await;
	connection.wait_for_object("browser@3", WAIT).await.unwrap();

	for guid in ["context@1", "page@1", "page@2", "frame@1"] {
		assert!(connection.get_object(guid).is_none(), "{guid} outlived its parent");
	}
	assert!(frame.is_disposed());
	let browser = connection.get_object("browser@1").unwrap();
	assert!(!browser.is_disposed());
	assert!(browser.children().is_empty());
	assert!(connection.get_object("browser@2").is_some());
}
