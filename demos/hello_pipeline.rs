use async_trait::async_trait;
use nagare::prelude::*;
use std::time::Duration;
use tracing::{debug, error};

fn hello(id: &'static str) -> impl UnitOfWork<(), String> {
    from_fn(move |_: Option<&()>| Ok(Some(format!("hello for {}", id))))
}

struct Delay(Duration);

#[async_trait]
impl UnitOfWork<String, String> for Delay {
    async fn process(&self, input: Option<&String>) -> Result<Option<String>, WorkError> {
        tokio::time::sleep(self.0).await;
        Ok(input.cloned())
    }
}

fn log(id: &'static str) -> impl UnitOfWork<String, String> {
    from_fn(move |input: Option<&String>| {
        debug!(step_id = id, input = ?input, "received input value");
        Ok(None)
    })
}

fn always_fail() -> impl UnitOfWork<String, String> {
    from_fn(|_: Option<&String>| Err(WorkError::new("error from step")))
}

fn log_failure() -> impl UnitOfWork<Option<String>, ()> {
    from_fn(|input: Option<&Option<String>>| {
        error!(
            input = ?input.and_then(Option::as_ref),
            "Received item to be handled as a failure"
        );
        Ok(None)
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut step1 = Step::new("step1", hello("step1"));
    let mut step2 = Step::new("step2", Delay(Duration::from_secs(3)));
    let mut step3 = Step::new("step3", log("step3"));
    let mut step4 = Step::new("step4", always_fail());
    let mut step5 = Step::new("step5", log_failure()).with_config(StepConfig {
        report_unwired_errors: false,
        ..StepConfig::default()
    });

    step1.connect_to(&mut step2)?;
    step2.connect_to(&mut step3)?;
    step3.connect_to(&mut step4)?;
    step4.error_to(&mut step5)?;

    let mut pipeline = Pipeline::new();
    pipeline
        .start(step1)
        .start(step2)
        .start(step3)
        .start(step4)
        .start(step5);

    if let Err(errors) = pipeline.run_until(shutdown_signal()).await {
        for error in errors {
            println!("Pipeline step failed: {:?}", error);
        }
    }

    Ok(())
}
