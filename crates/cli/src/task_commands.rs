use std::sync::Arc;

use {
    anyhow::{Result, bail},
    clap::Subcommand,
    secrecy::ExposeSecret,
    taskbridge_common::text::{single_line, truncate_chars},
    taskbridge_config::BridgeConfig,
    taskbridge_queue::{FileTaskStore, NewTask, Task, TaskStatus, TaskStore},
    taskbridge_tasks::Responder,
    taskbridge_whatsapp::{RetryPolicy, WhatsAppClient},
};

const PREVIEW_CHARS: usize = 48;

#[derive(Clone, Subcommand)]
pub enum TaskAction {
    /// List queued tasks, oldest first.
    List {
        /// Only show tasks in this state (pending, processing, completed, failed).
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print one task as JSON.
    Show { id: u64 },
    /// Remove a task permanently.
    Delete { id: u64 },
    /// Queue a failed task's message again as a new task.
    Requeue { id: u64 },
    /// Send a reply to the task's sender and record it.
    Reply {
        id: u64,
        #[arg(short, long)]
        message: String,
    },
}

pub async fn handle_tasks(action: TaskAction, config: &BridgeConfig) -> Result<()> {
    let store: Arc<dyn TaskStore> =
        Arc::new(FileTaskStore::new(config.queue.resolved_data_dir()));

    match action {
        TaskAction::List { status, json } => {
            let tasks = match status {
                Some(status) => store.list_by_status(status).await?,
                None => store.list().await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks.");
            } else {
                for line in table(&tasks) {
                    println!("{line}");
                }
            }
        },
        TaskAction::Show { id } => {
            let Some(task) = store.get(id).await? else {
                bail!("task #{id} not found");
            };
            println!("{}", serde_json::to_string_pretty(&task)?);
        },
        TaskAction::Delete { id } => {
            let task = store.delete(id).await?;
            println!("Deleted task #{} ({})", task.id, task.status);
        },
        TaskAction::Requeue { id } => {
            let task = requeue(&*store, id).await?;
            println!("Requeued task #{id} as #{}", task.id);
        },
        TaskAction::Reply { id, message } => {
            if config.whatsapp.access_token.expose_secret().is_empty() {
                bail!("whatsapp.access_token is not set (TASKBRIDGE_ACCESS_TOKEN)");
            }
            let sender = Arc::new(WhatsAppClient::from_config(&config.whatsapp)?);
            let responder = Responder::new(
                store,
                sender,
                RetryPolicy::from_config(&config.responder),
            );
            let task = responder.respond(id, &message).await?;
            println!("Replied to {} for task #{} ({})", task.source_id, task.id, task.status);
        },
    }
    Ok(())
}

/// Enqueue the body of failed task `id` again.
///
/// The new task carries no provider message ID: the original one is already
/// in the dedup set and would swallow it.
async fn requeue(store: &dyn TaskStore, id: u64) -> Result<Task> {
    let Some(old) = store.get(id).await? else {
        bail!("task #{id} not found");
    };
    match old.status {
        TaskStatus::Failed => {},
        TaskStatus::Processing => bail!(
            "task #{id} is processing; if its process stopped, `taskbridge serve` marks it failed on start"
        ),
        other => bail!("task #{id} is {other}, only failed tasks can be requeued"),
    }
    match store
        .enqueue(NewTask::new(&old.source_id, &old.body))
        .await?
        .task()
    {
        Some(task) => Ok(task.clone()),
        None => bail!("task #{id} was not requeued"),
    }
}

fn table(tasks: &[Task]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:>5}  {:<10}  {:<9}  {:<16}  {:<20}  {}",
        "ID", "STATUS", "CATEGORY", "FROM", "CREATED", "MESSAGE"
    )];
    for task in tasks {
        let category = task.category.map_or("-", |c| c.as_str());
        lines.push(format!(
            "{:>5}  {:<10}  {:<9}  {:<16}  {:<20}  {}",
            task.id,
            task.status.as_str(),
            category,
            task.source_id,
            task.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate_chars(&single_line(&task.body), PREVIEW_CHARS),
        ));
    }
    lines
}
