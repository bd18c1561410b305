use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use failure::Fail;
use log::{debug, info, warn};

use crossbeam_channel::{Receiver, Sender};

#[derive(Debug, Fail)]
pub enum ReaperError {
  #[fail(display = "Failed to create the reaper thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the reaper thread")]
  Stop,
}

enum Protocol {
  Stop,
}

/// Thread calling `task` on a fixed interval until stopped or dropped
pub struct Reaper {
  handler: Option<JoinHandle<()>>,
  protocol_tx: Sender<Protocol>,
}

impl Reaper {
  pub fn spawn<F>(interval: Duration, mut task: F) -> Result<Reaper, ReaperError>
  where
    F: FnMut() + Send + 'static,
  {
    info!("Spawning the reaper thread every {:?} ...", interval);

    let (protocol_tx, protocol_rx) = crossbeam_channel::bounded::<Protocol>(1);

    thread::Builder::new()
      .name("reaper".into())
      .spawn(move || Self::run(interval, protocol_rx, &mut task))
      .map_err(|err| ReaperError::Start {
        cause: err.to_string(),
      })
      .map(|handler| Reaper {
        handler: Some(handler),
        protocol_tx,
      })
  }

  fn run<F: FnMut()>(interval: Duration, protocol_rx: Receiver<Protocol>, task: &mut F) {
    let ticker = crossbeam_channel::tick(interval);
    loop {
      crossbeam_channel::select! {
        recv(ticker) -> _ => task(),
        recv(protocol_rx) -> _ => {
          debug!("Reaper thread stopped");
          break;
        }
      }
    }
  }

  pub fn stop(mut self) -> Result<(), ReaperError> {
    self.shutdown()
  }

  fn shutdown(&mut self) -> Result<(), ReaperError> {
    match self.handler.take() {
      Some(handler) => {
        info!("Stopping the reaper thread ...");
        drop(self.protocol_tx.send(Protocol::Stop));
        handler.join().map_err(|_| ReaperError::Stop)
      }
      None => Ok(()),
    }
  }
}

impl Drop for Reaper {
  fn drop(&mut self) {
    if let Err(err) = self.shutdown() {
      warn!("{}", err);
    }
  }
}
