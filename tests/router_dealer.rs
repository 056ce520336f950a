// tests/router_dealer.rs

use zsock::{Message, SocketType, ZmqError};
mod common;

use common::{recv_timeout, LONG_TIMEOUT, SHORT_TIMEOUT};

#[tokio::test]
async fn test_router_sees_dealer_identity() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let router = ctx.bind(SocketType::Router, &endpoint).await?;
  let dealer = ctx.socket(SocketType::Dealer)?;
  dealer.set_identity(b"D1")?;
  dealer.connect(&endpoint).await?;

  dealer.send("hello").await?;
  let request = recv_timeout(&router, LONG_TIMEOUT).await?;
  println!("Router received {:?}", request);
  assert_eq!(common::frames_as_strings(&request), vec!["D1", "hello"]);

  router.send(vec!["D1", "world"]).await?;
  let reply = recv_timeout(&dealer, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&reply), vec!["world"], "identity frame is stripped");

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_router_generates_identities_for_anonymous_peers() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();

  let router = ctx.bind(SocketType::Router, &endpoint).await?;
  let first = ctx.connect(SocketType::Dealer, &endpoint).await?;
  let second = ctx.connect(SocketType::Dealer, &endpoint).await?;

  first.send("from-first").await?;
  second.send("from-second").await?;

  let a = recv_timeout(&router, LONG_TIMEOUT).await?;
  let b = recv_timeout(&router, LONG_TIMEOUT).await?;
  let id_a = a.first().expect("identity").data().to_vec();
  let id_b = b.first().expect("identity").data().to_vec();
  assert_ne!(id_a, id_b);
  assert_eq!(id_a.first(), Some(&0u8), "generated identities start with a zero byte");

  // Reply to whichever peer sent "from-second".
  let (target, body) = if a.get(1).map(|f| f.data()) == Some(&b"from-second"[..]) {
    (id_a, "for-second")
  } else {
    (id_b, "for-second")
  };
  router.send(Message::new().with(target).with(body)).await?;
  let reply = recv_timeout(&second, LONG_TIMEOUT).await?;
  assert_eq!(common::frames_as_strings(&reply), vec!["for-second"]);
  assert!(matches!(recv_timeout(&first, SHORT_TIMEOUT).await, Err(ZmqError::Timeout)));

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_router_drops_unroutable_by_default() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();
  let router = ctx.bind(SocketType::Router, &endpoint).await?;

  let sent = router.send(vec!["nobody", "payload"]).await?;
  assert_eq!(sent, "nobody".len() + "payload".len());

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_mandatory_router_reports_unroutable() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let endpoint = common::unique_inproc_endpoint();
  let router = ctx.bind(SocketType::Router, &endpoint).await?;
  router.set_router_mandatory(true)?;
  assert!(router.router_mandatory()?);

  match router.send(vec!["nobody", "payload"]).await {
    Err(ZmqError::Unroutable(identity)) => assert_eq!(identity, "nobody"),
    other => panic!("expected Unroutable, got {other:?}"),
  }

  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_router_needs_identity_and_body() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let router = ctx.socket(SocketType::Router)?;
  let err = router.send("lonely").await.unwrap_err();
  assert!(matches!(err, ZmqError::InvalidMessage(_)), "got {err:?}");
  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_router_options_rejected_elsewhere() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let dealer = ctx.socket(SocketType::Dealer)?;
  assert!(matches!(
    dealer.set_router_mandatory(true),
    Err(ZmqError::InvalidOptionValue(_))
  ));
  ctx.close();
  Ok(())
}

#[tokio::test]
async fn test_dealer_round_robins_across_peers() -> Result<(), ZmqError> {
  let ctx = common::test_context();
  let ep1 = common::unique_inproc_endpoint();
  let ep2 = common::unique_inproc_endpoint();

  let worker1 = ctx.bind(SocketType::Router, &ep1).await?;
  let worker2 = ctx.bind(SocketType::Router, &ep2).await?;
  let dealer = ctx.socket(SocketType::Dealer)?;
  dealer.set_immediate(true)?;
  dealer.connect(&ep1).await?;
  dealer.connect(&ep2).await?;
  tokio::time::sleep(common::SETTLE).await;

  for i in 0..4 {
    dealer.send(format!("job-{i}")).await?;
  }

  let mut per_worker = [0usize; 2];
  for (idx, worker) in [&worker1, &worker2].into_iter().enumerate() {
    while let Ok(msg) = recv_timeout(worker, SHORT_TIMEOUT).await {
      assert_eq!(msg.len(), 2);
      per_worker[idx] += 1;
    }
  }
  assert_eq!(per_worker, [2, 2]);

  ctx.close();
  Ok(())
}
