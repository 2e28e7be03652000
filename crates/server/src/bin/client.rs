// 对运行中的服务器走一遍评论 API

use anyhow::Context;
use domain::{Comment, CommentWithReplies, Fine};
use serde_json::json;

const BASE_URL: &str = "http://127.0.0.1:3000";
const USER_HEADER: &str = "x-user-id";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    println!("Starting fine comments demo client...");

    println!("\n[1/4] Seeding users and a fine...");
    for (id, name) in [("alice", "Alice"), ("bob", "Bob")] {
        client
            .post(format!("{}/api/users", BASE_URL))
            .json(&json!({ "id": id, "display_name": name, "username": id }))
            .send()
            .await?
            .error_for_status()
            .context("Failed to seed user")?;
    }
    let fine: Fine = client
        .post(format!("{}/api/fines", BASE_URL))
        .json(&json!({
            "description": "Brought donuts without sprinkles",
            "subject_name": "Carol",
            "proposer_name": "Alice"
        }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("   -> Fine {}", fine.id);

    println!("\n[2/4] Alice comments...");
    let root: Comment = client
        .post(format!("{}/api/comments", BASE_URL))
        .header(USER_HEADER, "alice")
        .json(&json!({ "fine_id": fine.id, "content": "Nice catch" }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("   -> {}: {}", root.author_name, root.content);

    println!("\n[3/4] Bob replies, then tries to reply to his own reply...");
    let reply: Comment = client
        .post(format!("{}/api/comments", BASE_URL))
        .header(USER_HEADER, "bob")
        .json(&json!({ "fine_id": fine.id, "parent_id": root.id, "content": "Agreed" }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("   -> {}: {}", reply.author_name, reply.content);

    let resp = client
        .post(format!("{}/api/comments", BASE_URL))
        .header(USER_HEADER, "bob")
        .json(&json!({ "fine_id": fine.id, "parent_id": reply.id, "content": "Me too" }))
        .send()
        .await?;
    println!("   -> Rejected with {}: {}", resp.status(), resp.text().await?);

    println!("\n[4/4] Threaded view:");
    let threads: Vec<CommentWithReplies> = client
        .get(format!(
            "{}/api/fines/{}/comments/threaded?sort=thread",
            BASE_URL, fine.id
        ))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    for thread in threads {
        println!(
            "   - {} ({} replies)",
            thread.root.content(),
            thread.reply_count
        );
        for r in &thread.replies {
            println!("       - {}", r.content());
        }
    }

    Ok(())
}
