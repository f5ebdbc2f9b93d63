//! Concrete scenario 6: a five-node factory's `shutdown()` resolves, its
//! listeners are gone (a caller forced over TCP sees `Transport`), while a
//! same-process caller still reaches the node's channel and observes
//! `Stopped` rather than the call silently vanishing.

use skipplus::error::CallError;
use skipplus::factory::SkipNodeFactory;
use skipplus::reference::SkipReference;
use skipplus::registry::LocalNodes;
use skipplus::transport::Dispatcher;

#[tokio::test]
async fn shutdown_closes_listeners_but_keeps_local_short_circuit_answering_stopped() {
    let mut factory = SkipNodeFactory::new("127.0.0.1", 0, None);
    let mut references = Vec::new();
    for _ in 0..5 {
        references.push(factory.new_node().await.unwrap());
    }
    assert_eq!(factory.node_count(), 5);

    // kept alive across `shutdown()`: the same-process `LocalNodes` table
    // the factory itself populated, per spec.md §4.2's short-circuit rule.
    let local_dispatcher = factory.dispatcher().clone();

    factory.shutdown().await.unwrap();

    for reference in &references {
        let addr = reference.addr().unwrap();
        let result = local_dispatcher
            .call_remote::<SkipReference, ()>(addr, "linearise", reference.clone())
            .await;
        assert!(matches!(result, Err(CallError::Stopped)));
    }

    // a fresh dispatcher with an empty `LocalNodes` table forces these
    // calls over TCP, exercising the same path a caller in another process
    // would take — the listening sockets are closed by `shutdown()`, so
    // this now observes a refused connection instead of `Stopped`.
    let remote_dispatcher = Dispatcher::new(LocalNodes::new());

    for reference in &references {
        let addr = reference.addr().unwrap();
        let result = remote_dispatcher
            .call_remote::<SkipReference, ()>(addr, "linearise", reference.clone())
            .await;
        assert!(matches!(result, Err(CallError::Transport(_, _))));
    }
}
