use rustyline::error::ReadlineError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// One request for a line of user input.
#[derive(Debug)]
struct PromptRequest {
    prompt: String,
    reply: oneshot::Sender<Option<String>>,
}

/// Handle to the input source shared by every session of this process.
///
/// The source runs on its own thread or task and answers one request at a
/// time, so concurrent sessions never interleave their prompts.
#[derive(Debug, Clone)]
pub struct PromptHandle {
    tx: mpsc::Sender<PromptRequest>,
}

impl PromptHandle {
    /// Starts a line-editing prompt on a dedicated thread.
    pub fn interactive() -> Self {
        let (tx, mut rx) = mpsc::channel::<PromptRequest>(16);
        std::thread::spawn(move || {
            let mut editor = rustyline::Editor::<()>::new();
            while let Some(req) = rx.blocking_recv() {
                let line = match editor.readline(&req.prompt) {
                    Ok(line) => {
                        editor.add_history_entry(line.as_str());
                        Some(line)
                    }
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
                    Err(e) => {
                        warn!("Input error: {}", e);
                        None
                    }
                };
                let _ = req.reply.send(line);
            }
            debug!("Prompt thread finished");
        });
        Self { tx }
    }

    /// Answers prompts from a fixed list, then reports end of input.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn scripted(lines: Vec<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<PromptRequest>(16);
        tokio::spawn(async move {
            let mut lines = lines.into_iter();
            while let Some(req) = rx.recv().await {
                let _ = req.reply.send(lines.next());
            }
        });
        Self { tx }
    }

    /// Asks for one line. `None` means the input is closed.
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        let req = PromptRequest {
            prompt: prompt.to_string(),
            reply,
        };
        self.tx.send(req).await.ok()?;
        answer.await.ok().flatten()
    }
}
