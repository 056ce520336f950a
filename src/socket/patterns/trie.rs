// src/socket/patterns/trie.rs

use radix_trie::{Trie, TrieCommon};

/// Subscription wire messages: first byte, then the topic.
pub(crate) const SUBSCRIBE_CMD: u8 = 0x01;
pub(crate) const CANCEL_CMD: u8 = 0x00;

/// A set of topic prefixes with prefix matching.
///
/// Membership is a set: subscribing twice is the same as once and cancelling an absent prefix
/// changes nothing. The empty prefix is tracked separately and matches every message.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionSet {
  trie: Trie<Vec<u8>, ()>,
  match_all: bool,
}

impl SubscriptionSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns true if the prefix was not present before.
  pub fn subscribe(&mut self, prefix: &[u8]) -> bool {
    if prefix.is_empty() {
      return !std::mem::replace(&mut self.match_all, true);
    }
    self.trie.insert(prefix.to_vec(), ()).is_none()
  }

  /// Returns true if the prefix was present.
  pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
    if prefix.is_empty() {
      return std::mem::replace(&mut self.match_all, false);
    }
    self.trie.remove(&prefix.to_vec()).is_some()
  }

  pub fn matches(&self, data: &[u8]) -> bool {
    if self.match_all {
      return true;
    }
    if self.trie.is_empty() {
      return false;
    }
    self.trie.get_ancestor_value(&data.to_vec()).is_some()
  }

  /// Every subscribed prefix, used to replay subscriptions to a new peer.
  pub fn topics(&self) -> Vec<Vec<u8>> {
    let mut topics: Vec<Vec<u8>> = self.trie.keys().cloned().collect();
    if self.match_all {
      topics.insert(0, Vec::new());
    }
    topics
  }
}

/// Builds a subscribe (`0x01`) or cancel (`0x00`) message body.
pub(crate) fn subscription_message(subscribe: bool, topic: &[u8]) -> Vec<u8> {
  let mut body = Vec::with_capacity(topic.len() + 1);
  body.push(if subscribe { SUBSCRIBE_CMD } else { CANCEL_CMD });
  body.extend_from_slice(topic);
  body
}

/// Splits a subscription message into (is_subscribe, topic).
pub(crate) fn parse_subscription_message(body: &[u8]) -> Option<(bool, &[u8])> {
  match body.split_first() {
    Some((&SUBSCRIBE_CMD, topic)) => Some((true, topic)),
    Some((&CANCEL_CMD, topic)) => Some((false, topic)),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prefix_matching() {
    let mut subs = SubscriptionSet::new();
    subs.subscribe(b"A");
    subs.subscribe(b"C");
    assert!(subs.matches(b"Apple"));
    assert!(subs.matches(b"C"));
    assert!(!subs.matches(b"Banana"));
    assert!(!subs.matches(b""));
  }

  #[test]
  fn nested_prefixes() {
    let mut subs = SubscriptionSet::new();
    subs.subscribe(b"weather.");
    subs.subscribe(b"weather.paris");
    subs.unsubscribe(b"weather.");
    assert!(subs.matches(b"weather.paris.today"));
    assert!(!subs.matches(b"weather.london"));
  }

  #[test]
  fn membership_is_idempotent() {
    let mut subs = SubscriptionSet::new();
    assert!(subs.subscribe(b"x"));
    assert!(!subs.subscribe(b"x"));
    assert_eq!(subs.topics(), vec![b"x".to_vec()]);
    assert!(!subs.unsubscribe(b"nope"));
    assert!(subs.matches(b"xyz"));
    assert!(subs.unsubscribe(b"x"));
    assert!(!subs.matches(b"xyz"));
  }

  #[test]
  fn empty_prefix_matches_everything() {
    let mut subs = SubscriptionSet::new();
    assert!(subs.subscribe(b""));
    assert!(subs.matches(b""));
    assert!(subs.matches(b"anything"));
    assert_eq!(subs.topics(), vec![Vec::<u8>::new()]);
    assert!(subs.unsubscribe(b""));
    assert!(subs.topics().is_empty());
  }

  #[test]
  fn wire_messages() {
    assert_eq!(subscription_message(true, b"ab"), vec![1, b'a', b'b']);
    assert_eq!(parse_subscription_message(&[0, b'z']), Some((false, &b"z"[..])));
    assert_eq!(parse_subscription_message(&[7]), None);
    assert_eq!(parse_subscription_message(&[]), None);
  }
}
