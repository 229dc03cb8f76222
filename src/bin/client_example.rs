//! Example client for the mission control API

use mission_control::api::{Client, HttpClientImpl};
use mission_control::models::{NewTask, TaskPatch, TaskStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create a client with default configuration (localhost:3000)
    // You can customize with ClientConfig if needed
    let client = HttpClientImpl::new();
    println!("Mission Control API Client Example");
    println!("----------------------------------");

    println!("\nFetching goals...");
    let tree = client.goal_tree().await?;
    println!("{} goals in {}", tree.goals.len(), tree.data_file);
    for root in &tree.roots {
        let progress = tree.progress.get(root).copied().unwrap_or(0.0);
        println!("  {} at {:.0}%", root, progress);
    }

    println!("\nAdding a task...");
    let task = client
        .create_task(NewTask {
            project_id: "mission-control".to_string(),
            title: "Client example task".to_string(),
            ..Default::default()
        })
        .await?;
    println!("Added task {}", task.id);

    println!("\nStarting the task...");
    let task = client
        .update_task(
            &task.id,
            TaskPatch {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
        )
        .await?;
    println!("Task is now {}", task.status);

    println!("\nRemoving the task...");
    client.delete_task(&task.id).await?;
    println!("Done");

    Ok(())
}
