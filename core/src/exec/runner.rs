//! Builtin tool dispatch
//!
//! Maps a gated call onto the sandbox, the session engines, or the
//! delegation sub-loop. Network tools are wrapped in the result cache;
//! failures become error payloads so one bad call never aborts a batch.

use super::{ToolCall, ToolCoordinator};
use crate::events::SessionUpdate;
use crate::orchestrator::delegate;
use crate::session::{PendingCodeEdit, Session};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT_SEC: u64 = 30;

pub(super) struct RunOutcome {
    pub ok: bool,
    pub value: Value,
    pub from_cache: bool,
}

impl RunOutcome {
    fn ok(value: Value) -> Self {
        RunOutcome {
            ok: true,
            value,
            from_cache: false,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        RunOutcome {
            ok: false,
            value: json!({ "error": message.into() }),
            from_cache: false,
        }
    }
}

fn str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(|s| s.to_string())
}

fn timeout_arg(args: &Value) -> Duration {
    Duration::from_secs(
        args.get("timeout_sec")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SEC),
    )
}

impl ToolCoordinator {
    /// Run one already-gated call with its patched arguments.
    pub(super) async fn run_one(
        &self,
        session: &mut Session,
        call: &ToolCall,
        args: &Value,
        depth: usize,
    ) -> RunOutcome {
        match call.name.as_str() {
            "run_bash" => {
                let Some(cmd) = str_arg(args, "cmd") else {
                    return RunOutcome::err("run_bash requires a string `cmd`");
                };
                self.run_process("bash", vec!["-lc".to_string(), cmd], timeout_arg(args))
                    .await
            }
            "run_python" => {
                let Some(code) = str_arg(args, "code") else {
                    return RunOutcome::err("run_python requires a string `code`");
                };
                self.run_process("python3", vec!["-c".to_string(), code], timeout_arg(args))
                    .await
            }
            "read_file" => {
                let Some(path) = str_arg(args, "path") else {
                    return RunOutcome::err("read_file requires a string `path`");
                };
                match self.sandbox().read_file(&path).await {
                    Ok(content) => RunOutcome::ok(json!({ "path": path, "content": content })),
                    Err(e) => RunOutcome::err(e.to_string()),
                }
            }
            "write_file" => {
                let (Some(path), Some(content)) =
                    (str_arg(args, "path"), str_arg(args, "content"))
                else {
                    return RunOutcome::err("write_file requires `path` and `content`");
                };
                match self.sandbox().write_file(&path, &content).await {
                    Ok(()) => RunOutcome::ok(json!({ "path": path, "bytes": content.len() })),
                    Err(e) => RunOutcome::err(e.to_string()),
                }
            }
            "list_files" => {
                let path = str_arg(args, "path").unwrap_or_else(|| ".".to_string());
                match self.sandbox().list_dir(&path).await {
                    Ok(entries) => RunOutcome::ok(json!({ "path": path, "entries": entries })),
                    Err(e) => RunOutcome::err(e.to_string()),
                }
            }
            "move_file" => {
                let (Some(from), Some(to)) = (str_arg(args, "from"), str_arg(args, "to")) else {
                    return RunOutcome::err("move_file requires `from` and `to`");
                };
                match self.sandbox().move_path(&from, &to).await {
                    Ok(()) => RunOutcome::ok(json!({ "moved": true, "from": from, "to": to })),
                    Err(e) => RunOutcome::err(e.to_string()),
                }
            }
            "delete_path" => {
                let Some(path) = str_arg(args, "path") else {
                    return RunOutcome::err("delete_path requires a string `path`");
                };
                match self.sandbox().delete_path(&path).await {
                    Ok(()) => RunOutcome::ok(json!({ "deleted": true, "path": path })),
                    Err(e) => RunOutcome::err(e.to_string()),
                }
            }
            "edit_file" => self.stage_code_edit(session, args),
            "fetch_url" => self.fetch_url(session, args).await,
            "search_web" => self.search_web(session, args).await,
            "commit_memory" => {
                let Some(text) = str_arg(args, "text") else {
                    return RunOutcome::err("commit_memory requires a string `text`");
                };
                let (id, timestamp) = session.memory.commit(&text);
                self.updates().send(SessionUpdate {
                    memory_snapshot: Some(session.memory.entries()),
                    ..Default::default()
                });
                RunOutcome::ok(json!({ "id": id, "timestamp": timestamp }))
            }
            "recall_memory" => {
                let Some(query) = str_arg(args, "query") else {
                    return RunOutcome::err("recall_memory requires a string `query`");
                };
                let max_results = args
                    .get("max_results")
                    .and_then(Value::as_u64)
                    .unwrap_or(5) as usize;
                let results = session.memory.query(&query, max_results);
                RunOutcome::ok(json!({ "results": results }))
            }
            "delegate_task" => {
                if depth > 0 {
                    return RunOutcome::err("nested delegation is not permitted");
                }
                let Some(task) = str_arg(args, "task") else {
                    return RunOutcome::err("delegate_task requires a string `task`");
                };
                // Boxed: the sub-loop re-enters batch execution. Local so
                // the recursion does not impose a Send bound on itself; the
                // turn is driven on one task, never spawned.
                let fut: futures::future::LocalBoxFuture<'_, crate::error::Result<delegate::DelegateOutcome>> =
                    Box::pin(delegate::run_delegate(self, session, &task));
                match fut.await {
                    Ok(outcome) => RunOutcome::ok(json!({
                        "answer": outcome.answer,
                        "transcript": outcome.transcript,
                    })),
                    Err(e) => RunOutcome::err(e.to_string()),
                }
            }
            other => RunOutcome::err(format!("tool {} has no runner", other)),
        }
    }

    async fn run_process(
        &self,
        program: &str,
        args: Vec<String>,
        timeout: Duration,
    ) -> RunOutcome {
        match self.sandbox().run_command(program, &args, timeout).await {
            Ok(output) => RunOutcome::ok(json!({
                "exit_code": output.exit_code,
                "stdout": output.stdout,
                "stderr": output.stderr,
                "truncated": output.truncated,
            })),
            Err(e) => RunOutcome::err(e.to_string()),
        }
    }

    /// Code edits never touch disk directly; they park on the session until
    /// explicitly approved.
    fn stage_code_edit(&self, session: &mut Session, args: &Value) -> RunOutcome {
        let (Some(path), Some(new_content)) =
            (str_arg(args, "path"), str_arg(args, "new_content"))
        else {
            return RunOutcome::err("edit_file requires `path` and `new_content`");
        };
        let edit = PendingCodeEdit {
            id: format!("edit-{}", Uuid::new_v4()),
            path,
            new_content,
            description: str_arg(args, "description").unwrap_or_default(),
        };
        session.pending_code_edit = Some(edit.clone());
        self.updates().send(SessionUpdate {
            pending_code_edit: Some(Some(edit.clone())),
            ..Default::default()
        });
        RunOutcome::ok(json!({
            "status": "pending_approval",
            "edit_id": edit.id,
            "path": edit.path,
        }))
    }

    async fn fetch_url(&self, session: &mut Session, args: &Value) -> RunOutcome {
        let Some(url) = str_arg(args, "url") else {
            return RunOutcome::err("fetch_url requires a string `url`");
        };
        let timeout = timeout_arg(args);

        let sandbox = self.sandbox();
        let outcome = session
            .cache
            .cached_call("fetch_url", args, || async {
                let body = sandbox.fetch(&url, timeout).await?;
                Ok(json!({ "url": url.clone(), "body": body }))
            })
            .await;

        RunOutcome {
            ok: outcome.ok,
            value: outcome.value,
            from_cache: outcome.from_cache,
        }
    }

    async fn search_web(&self, session: &mut Session, args: &Value) -> RunOutcome {
        let Some(query) = str_arg(args, "query") else {
            return RunOutcome::err("search_web requires a string `query`");
        };
        let timeout = timeout_arg(args);
        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(&query)
        );

        let sandbox = self.sandbox();
        let outcome = session
            .cache
            .cached_call("search_web", args, || async {
                let body = sandbox.fetch(&url, timeout).await?;
                Ok(json!({ "query": query.clone(), "body": body }))
            })
            .await;

        RunOutcome {
            ok: outcome.ok,
            value: outcome.value,
            from_cache: outcome.from_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UpdateSender;
    use crate::exec::BatchOutcome;
    use crate::llm::AgentProfile;
    use crate::policy::{GlobalPolicy, SafetyLevel};
    use crate::sandbox::LocalSandbox;
    use std::sync::Arc;

    fn open_policy() -> GlobalPolicy {
        GlobalPolicy {
            allow_safety_levels: vec![
                SafetyLevel::Safe,
                SafetyLevel::Sensitive,
                SafetyLevel::Admin,
            ],
            require_consent_for_sensitive: false,
            require_consent_for_admin: false,
            ..GlobalPolicy::default()
        }
    }

    fn setup(dir: &tempfile::TempDir) -> (ToolCoordinator, Session) {
        let sandbox = Arc::new(LocalSandbox::new(dir.path()).unwrap());
        let provider = Arc::new(crate::orchestrator::testing::ScriptedProvider::empty());
        let coordinator = ToolCoordinator::new(sandbox, provider, UpdateSender::sink());
        let session = Session::new("s", open_policy(), AgentProfile::standard());
        (coordinator, session)
    }

    async fn run(
        coordinator: &ToolCoordinator,
        session: &mut Session,
        name: &str,
        args: Value,
    ) -> crate::exec::ToolResult {
        let calls = vec![ToolCall {
            id: "c1".to_string(),
            name: name.to_string(),
            args,
        }];
        match coordinator.execute_batch(session, &calls, 0).await {
            BatchOutcome::Completed(mut results) => results.remove(0),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_tools_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut session) = setup(&dir);

        let result = run(
            &coordinator,
            &mut session,
            "write_file",
            json!({"path": "a.txt", "content": "hi"}),
        )
        .await;
        assert!(result.ok, "{}", result.value);

        let result = run(
            &coordinator,
            &mut session,
            "read_file",
            json!({"path": "a.txt"}),
        )
        .await;
        assert_eq!(result.value["content"], "hi");

        let result = run(&coordinator, &mut session, "list_files", json!({})).await;
        assert_eq!(result.value["entries"][0]["name"], "a.txt");
    }

    #[tokio::test]
    async fn test_run_bash_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut session) = setup(&dir);
        let result = run(
            &coordinator,
            &mut session,
            "run_bash",
            json!({"cmd": "echo out; exit 3"}),
        )
        .await;
        assert!(result.ok);
        assert_eq!(result.value["exit_code"], 3);
        assert_eq!(result.value["stdout"].as_str().unwrap().trim(), "out");
    }

    #[tokio::test]
    async fn test_memory_tools() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut session) = setup(&dir);

        let result = run(
            &coordinator,
            &mut session,
            "commit_memory",
            json!({"text": "favorite color is green"}),
        )
        .await;
        assert!(result.ok);

        let result = run(
            &coordinator,
            &mut session,
            "recall_memory",
            json!({"query": "favorite color"}),
        )
        .await;
        assert_eq!(result.value["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_file_parks_instead_of_writing() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut session) = setup(&dir);

        let result = run(
            &coordinator,
            &mut session,
            "edit_file",
            json!({"path": "main.rs", "new_content": "fn main() {}", "description": "stub"}),
        )
        .await;
        assert!(result.ok);
        assert_eq!(result.value["status"], "pending_approval");
        assert!(session.pending_code_edit.is_some());
        assert!(coordinator.sandbox().read_file("main.rs").await.is_err());

        let edit_id = result.value["edit_id"].as_str().unwrap().to_string();
        coordinator
            .resolve_code_edit(&mut session, &edit_id, true)
            .await
            .unwrap();
        assert_eq!(
            coordinator.sandbox().read_file("main.rs").await.unwrap(),
            "fn main() {}"
        );
    }

    #[tokio::test]
    async fn test_delegate_task_dispatch_returns_answer() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(LocalSandbox::new(dir.path()).unwrap());
        let provider = Arc::new(crate::orchestrator::testing::ScriptedProvider::new(vec![vec![
            crate::llm::StreamChunk::Text("delegated result".to_string()),
            crate::llm::StreamChunk::Done,
        ]]));
        let coordinator = ToolCoordinator::new(sandbox, provider, UpdateSender::sink());
        let mut session = Session::new("s", open_policy(), AgentProfile::standard());

        let result = run(
            &coordinator,
            &mut session,
            "delegate_task",
            json!({"task": "summarize the data"}),
        )
        .await;
        assert!(result.ok, "{}", result.value);
        assert_eq!(result.value["answer"], "delegated result");
    }

    #[tokio::test]
    async fn test_missing_args_are_call_level_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, mut session) = setup(&dir);
        let result = run(&coordinator, &mut session, "run_bash", json!({})).await;
        assert!(!result.ok);
        assert!(result.value["error"].as_str().unwrap().contains("cmd"));
    }
}
