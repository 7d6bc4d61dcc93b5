//! Dispatcher - runs one command against a TreeManager
//!
//! Each action maps onto exactly one manager call. Results are plain JSON
//! values so the same dispatcher serves the line protocol and the CLI.

use crate::command::Command;
use hypotree_core::{Error, Request, Response, Result};
use hypotree_engine::TreeManager;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub struct Dispatcher {
    manager: Arc<TreeManager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<TreeManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<TreeManager> {
        &self.manager
    }

    /// Parse and run an action by name.
    pub async fn call(&self, action: &str, params: &Value) -> Result<Value> {
        let command = Command::parse(action, params)?;
        self.execute(command).await
    }

    pub async fn execute(&self, command: Command) -> Result<Value> {
        debug!("dispatch: {} tree={:?}", command.action(), command.tree_id());
        let m = &self.manager;
        match command {
            Command::CreateTree { description } => {
                let tree_id = m.create_tree(&description).await?;
                Ok(json!({ "tree_id": tree_id }))
            }
            Command::AddChild {
                tree_id,
                parent_id,
                description,
                node_type,
                context,
            } => {
                let node_id = m
                    .add_child(&tree_id, &parent_id, &description, node_type, context)
                    .await?;
                Ok(json!({ "tree_id": tree_id, "node_id": node_id }))
            }
            Command::Start { tree_id, node_id } => {
                m.start_node(&tree_id, &node_id).await?;
                Ok(json!({ "tree_id": tree_id, "node_id": node_id, "status": "in_progress" }))
            }
            Command::SetResult {
                tree_id,
                node_id,
                confirmed,
                evidence,
                confidence,
            } => {
                m.set_node_result(&tree_id, &node_id, confirmed, &evidence, confidence)
                    .await?;
                Ok(json!({ "tree_id": tree_id, "node_id": node_id, "status": "completed" }))
            }
            Command::Reject {
                tree_id,
                node_id,
                reason,
            } => {
                m.reject_node(&tree_id, &node_id, &reason).await?;
                Ok(json!({ "tree_id": tree_id, "node_id": node_id, "status": "rejected" }))
            }
            Command::Aggregate { tree_id } => to_json(&m.aggregate_upward(&tree_id).await?),
            Command::GetSynthesis { tree_id } => match m.get_final_synthesis(&tree_id).await? {
                Some(synthesis) => to_json(&synthesis),
                None => Ok(json!({ "computed": false, "message": "not yet computed" })),
            },
            Command::GetStatus { tree_id } => to_json(&m.get_status(&tree_id).await?),
            Command::ListTrees => {
                let trees = m.list_trees().await?;
                Ok(json!({ "trees": trees }))
            }
            Command::DeleteTree { tree_id } => {
                m.delete_tree(&tree_id).await?;
                Ok(json!({ "tree_id": tree_id, "deleted": true }))
            }
        }
    }

    /// Run a request and wrap the outcome in the response envelope.
    pub async fn dispatch(&self, request: Request) -> Response {
        let result = self.call(&request.action, &request.params).await;
        if let Err(e) = &result {
            debug!("dispatch: {} failed: {}", request.action, e);
        }
        Response::from_result(request.id, result)
    }

    /// Handle one protocol line. Never fails: a line that is not a request
    /// becomes a MALFORMED_REQUEST response, echoing its id when one is
    /// readable.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                let id = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(Value::as_str).map(String::from));
                Response {
                    id,
                    ..Response::malformed(format!("invalid request: {}", e))
                }
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Persistence(format!("response encoding: {}", e)))
}
