use std::io;
use std::sync::Arc;

use parapal_config::{default_store_dir, load_grader_config, DEFAULT_SESSION_ID};
use parapal_core::{
    GradingEngine, GradingRuntime, OfflineGradingEngine, RuntimeConfig, RuntimeServices,
};
use parapal_grader::GradingClient;
use parapal_protocol::{EventMsg, Op, Submission};
use parapal_rubric_store::{RubricStore, RubricStoreConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV_KEY: &str = "PARAPAL_LOG";

fn other_io_error(err: impl std::fmt::Display) -> io::Error {
    io::Error::other(err.to_string())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV_KEY).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let (engine, store_dir, session_id) = match load_grader_config() {
        Ok(config) => {
            let store_dir = config.store_dir.clone();
            let session_id = config.session_id.clone();
            let engine: Arc<dyn GradingEngine> = Arc::new(GradingClient::from_env_token(config));
            (engine, store_dir, session_id)
        }
        Err(err) => {
            warn!(error = %err, "grading service not configured; grading disabled");
            let engine: Arc<dyn GradingEngine> = Arc::new(OfflineGradingEngine::new(format!(
                "Grading is unavailable: {err}"
            )));
            (engine, default_store_dir(), DEFAULT_SESSION_ID.to_string())
        }
    };

    let store = RubricStore::open(RubricStoreConfig {
        root_dir: store_dir,
        seed_starter_rubrics: true,
    })
    .map_err(other_io_error)?;

    let mut runtime = GradingRuntime::spawn(
        RuntimeConfig {
            session_id,
            ..RuntimeConfig::default()
        },
        RuntimeServices::new(engine, store),
    );
    let submission_tx = runtime.submission_sender();

    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let submission = match serde_json::from_str::<Submission>(&line) {
                Ok(item) => item,
                Err(err) => {
                    warn!(error = %err, "invalid submission json");
                    continue;
                }
            };

            if submission_tx.send(submission).await.is_err() {
                return Ok(());
            }
        }

        // stdin closed without an explicit shutdown
        let _ = submission_tx
            .send(Submission {
                id: "eof".to_string(),
                op: Op::Shutdown,
            })
            .await;
        Ok::<(), io::Error>(())
    });

    let mut stdout = tokio::io::stdout();
    while let Some(event) = runtime.events_mut().recv().await {
        let line = serde_json::to_string(&event)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;

        if matches!(event.msg, EventMsg::ShutdownComplete) {
            break;
        }
    }

    if stdin_task.is_finished() {
        if let Ok(Err(err)) = stdin_task.await {
            error!(error = %err, "stdin reader stopped");
        }
    } else {
        stdin_task.abort();
    }

    runtime
        .join()
        .await
        .map_err(other_io_error)?;

    Ok(())
}
