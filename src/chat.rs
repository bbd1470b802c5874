//! Session driver and the interactive terminal chat.
//!
//! [`ask`] runs one question through a [`ConversationSession`]:
//! the user turn is recorded first, then the pipeline runs, then either the
//! assistant turn is appended or the session is returned to idle and a
//! [`Notification`] is produced. Notifications are scrubbed of the API
//! credential before they leave this module.

use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use medibot_core::error::{Notification, PipelineError};
use medibot_core::models::AnswerRecord;
use medibot_core::session::{ConversationSession, SessionError};

use crate::pipeline::Pipeline;

const TITLE: &str = "🏥 Medical AI Assistant";
const SUBTITLE: &str = "Ask me any medical question and I'll provide evidence-based answers";
const SEARCHING: &str = "🔍 Searching medical database...";

fn busy_notification(err: SessionError) -> Notification {
    Notification::new(
        "busy",
        format!("❌ Error: {}", err),
        "💡 Wait for the current answer before asking another question",
    )
}

/// Ask `question` within `session`.
pub async fn ask(
    session: &mut ConversationSession,
    pipeline: &Pipeline,
    question: &str,
    cancel: &CancellationToken,
) -> Result<AnswerRecord, Notification> {
    session.submit(question).map_err(busy_notification)?;
    let outcome = pipeline.answer(question, cancel).await;
    settle(session, pipeline, outcome)
}

/// [`ask`] for a session shared between tasks.
///
/// The lock is taken only to submit and to settle, so readers see the pending
/// question while the answer is produced. Also returns the transcript length
/// once the answer is recorded.
pub async fn ask_shared(
    session: &Mutex<ConversationSession>,
    pipeline: &Pipeline,
    question: &str,
    cancel: &CancellationToken,
) -> Result<(AnswerRecord, usize), Notification> {
    session
        .lock()
        .await
        .submit(question)
        .map_err(busy_notification)?;

    let outcome = pipeline.answer(question, cancel).await;

    let mut session = session.lock().await;
    let record = settle(&mut session, pipeline, outcome)?;
    Ok((record, session.transcript().len()))
}

fn settle(
    session: &mut ConversationSession,
    pipeline: &Pipeline,
    outcome: Result<AnswerRecord, PipelineError>,
) -> Result<AnswerRecord, Notification> {
    match outcome {
        Ok(record) => {
            if let Err(e) = session.complete(record.display.clone()) {
                warn!(error = %e, "session ended before the answer arrived");
            }
            Ok(record)
        }
        Err(e) => {
            let notification = e.notification().redacted(pipeline.credential());
            warn!(
                code = %notification.code,
                error = notification.detail.as_deref().unwrap_or_default(),
                "question failed"
            );
            let _ = session.fail();
            Err(notification)
        }
    }
}

/// Read the next line, or `None` at end of input or once `interrupt` resolves.
async fn next_input<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => line,
        () = interrupt => Ok(None),
    }
}

/// Cancel `token` when Ctrl-C is pressed. Abort the handle once the request is done.
fn cancel_on_ctrl_c(token: &CancellationToken) -> JoinHandle<()> {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

/// Answer a single question and print it, for `medibot ask`.
pub async fn run_ask(pipeline: &Pipeline, question: &str) -> anyhow::Result<()> {
    let mut session = ConversationSession::new();
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(&cancel);

    let outcome = ask(&mut session, pipeline, question, &cancel).await;
    watcher.abort();

    match outcome {
        Ok(record) => {
            println!("{}", record.display);
            Ok(())
        }
        Err(notification) => anyhow::bail!("{}", notification),
    }
}

/// Interactive chat over stdin/stdout, for `medibot chat`.
///
/// Empty lines are ignored and `/history` reprints the transcript. `/quit`,
/// end of input or Ctrl-C at the prompt exits. Ctrl-C while a question is
/// being answered cancels only that question.
pub async fn run_chat(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut session = ConversationSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", TITLE);
    println!("{}\n", SUBTITLE);

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let interrupt = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let Some(line) = next_input(&mut lines, interrupt).await? else {
            println!();
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for turn in session.transcript() {
                    println!("[{}] {}\n", turn.role, turn.content);
                }
                continue;
            }
            _ => {}
        }

        println!("{}", SEARCHING);

        let cancel = CancellationToken::new();
        let watcher = cancel_on_ctrl_c(&cancel);
        let outcome = ask(&mut session, pipeline, question, &cancel).await;
        watcher.abort();

        match outcome {
            Ok(record) => println!("\nAssistant: {}\n", record.display),
            Err(notification) => eprintln!("\n{}\n", notification),
        }
    }

    session.end();
    Ok(())
}
