use fibre_inject::{
  print_registry_report, ClassBuilder, Injectable, InjectableOptions, Injector, Parameter,
  Registry, Signature,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// --- Services ---
struct ConnectionPool {
  size: usize,
}

impl Injectable for ConnectionPool {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(Signature::new(), |_| Ok(ConnectionPool { size: 4 }))
  }
}

static NEXT_REQUEST: AtomicUsize = AtomicUsize::new(1);

struct RequestId(usize);

impl Injectable for RequestId {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(Signature::new(), |_| {
      Ok(RequestId(NEXT_REQUEST.fetch_add(1, Ordering::SeqCst)))
    })
  }
}

struct UserHandler {
  pool: Arc<ConnectionPool>,
  request: Arc<RequestId>,
}

impl UserHandler {
  fn handle(&self, user: &str) -> String {
    format!(
      "request #{} loaded '{}' using a pool of {}",
      self.request.0, user, self.pool.size
    )
  }
}

impl Injectable for UserHandler {
  fn describe() -> ClassBuilder<Self> {
    ClassBuilder::new().constructor(
      Signature::new()
        .param(Parameter::of::<ConnectionPool>("pool"))
        .param(Parameter::of::<RequestId>("request")),
      |args| {
        Ok(UserHandler {
          pool: args.take("pool")?,
          request: args.take("request")?,
        })
      },
    )
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .init();

  // --- Registration ---
  let mut registry = Registry::new();
  registry
    .injectable::<ConnectionPool>(InjectableOptions::singleton())
    .injectable::<RequestId>(InjectableOptions::scoped())
    .injectable::<UserHandler>(InjectableOptions::scoped());
  let injector = Injector::new(registry).expect("failed to build the injector");

  // --- One Session Per Request ---
  let mut pools = Vec::new();
  for user in ["alice", "bob"] {
    let session = injector
      .get_scoped_session()
      .expect("failed to open a session");
    let handler = session
      .require::<UserHandler>()
      .expect("failed to build the handler");
    println!("{}", handler.handle(user));

    let again = session.require::<UserHandler>().unwrap();
    assert!(
      Arc::ptr_eq(&handler, &again),
      "Scoped handlers should be shared within a request"
    );
    pools.push(Arc::clone(&handler.pool));
  }

  assert!(
    Arc::ptr_eq(&pools[0], &pools[1]),
    "The connection pool should be shared across requests"
  );
  println!("\nBoth requests shared the same connection pool.");

  // --- Outside A Session ---
  match injector.require::<RequestId>() {
    Ok(_) => panic!("Scoped services must not resolve outside a session!"),
    Err(err) => println!("Correctly refused: {}", err),
  }

  println!();
  print_registry_report(&injector);
}
