// src/socket/patterns/fair_queue.rs

use crate::error::ZmqError;
use async_channel::{Receiver, Sender, TryRecvError};

/// Socket-wide inbound queue fed by every attached pipe.
///
/// Each pipe driver pushes whole messages; the application side pops them in arrival order,
/// which interleaves peers fairly since no driver can run ahead of the bounded capacity.
/// A conflating queue keeps only the most recent item.
#[derive(Debug)]
pub(crate) struct FairQueue<T: Send + 'static> {
  receiver: Receiver<T>,
  sender: Sender<T>,
  conflate: bool,
}

impl<T: Send + 'static> FairQueue<T> {
  /// `hwm == 0` means unbounded.
  pub fn new(hwm: usize, conflate: bool) -> Self {
    let capacity = if conflate { Some(1) } else { (hwm > 0).then_some(hwm) };
    let (sender, receiver) = match capacity {
      Some(cap) => async_channel::bounded(cap),
      None => async_channel::unbounded(),
    };
    Self {
      receiver,
      sender,
      conflate,
    }
  }

  /// Pushes an item, waiting for room unless the queue conflates.
  pub async fn push_item(&self, item: T) -> Result<(), ZmqError> {
    if self.conflate {
      return self
        .sender
        .force_send(item)
        .map(|_| ())
        .map_err(|_| ZmqError::SocketClosed);
    }
    self.sender.send(item).await.map_err(|_| {
      tracing::trace!("FairQueue push on closed queue");
      ZmqError::SocketClosed
    })
  }

  /// Waits for the next item; `Ok(None)` once the queue is closed.
  pub async fn pop_item(&self) -> Result<Option<T>, ZmqError> {
    match self.receiver.recv().await {
      Ok(item) => Ok(Some(item)),
      Err(async_channel::RecvError) => Ok(None),
    }
  }

  pub fn try_pop_item(&self) -> Result<Option<T>, ZmqError> {
    match self.receiver.try_recv() {
      Ok(item) => Ok(Some(item)),
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Closed) => Err(ZmqError::SocketClosed),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.receiver.is_empty()
  }

  pub fn close(&self) {
    self.sender.close();
  }
}
