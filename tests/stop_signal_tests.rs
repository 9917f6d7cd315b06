#![cfg(unix)]

use std::time::Duration;
use svc_connect::service::{StopSignal, StopSignals};

fn send_to_self(signal: &str) {
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("kill -{signal} {}", std::process::id()))
        .status()
        .expect("failed to run kill");
    assert!(status.success(), "kill -{signal} failed");
}

async fn stop_after(signal: &str) -> StopSignal {
    let signals = StopSignals::install().expect("failed to install handlers");
    send_to_self(signal);
    tokio::time::timeout(Duration::from_secs(5), signals.recv())
        .await
        .expect("signal not observed")
}

// Signals are process-wide and every installed watcher sees them, so these share one test.
#[tokio::test]
async fn each_stop_signal_is_caught_instead_of_killing_the_process() {
    assert_eq!(stop_after("TERM").await, StopSignal::Terminate);
    assert_eq!(stop_after("HUP").await, StopSignal::Hangup);
    assert_eq!(stop_after("INT").await, StopSignal::Interrupt);
}
