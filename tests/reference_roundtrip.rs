//! Concrete scenarios 2 and 3: a method returning a `SkipReference` or a
//! `BitString` round-trips identically through a remote call.

use skipplus::bitstring::random_bit_string;
use skipplus::factory::NodeFactory;
use skipplus::reference::SkipReference;
use skipplus::registry::MethodRegistry;
use skipplus::wire;

#[tokio::test]
async fn reference_round_trips_through_a_remote_call() {
    let mut factory = NodeFactory::new("127.0.0.1", 0);

    let (node0_addr, _) = factory.new_node(|_addr, _d| ((), MethodRegistry::new())).await.unwrap();
    let node0_reference = SkipReference::new(
        node0_addr.ip().to_string(),
        node0_addr.port(),
        random_bit_string(2),
    );

    let returned = node0_reference.clone();
    let (_node1_addr, _) = factory
        .new_node(move |_addr, _dispatcher| {
            let mut registry: MethodRegistry<()> = MethodRegistry::new();
            registry.register("peer", move |_state, _args| wire::encode(&returned));
            ((), registry)
        })
        .await
        .unwrap();

    let fetched: SkipReference = factory
        .dispatcher()
        .call_remote(_node1_addr, "peer", ())
        .await
        .unwrap();
    assert_eq!(fetched, node0_reference);

    factory.shutdown().await.unwrap();
}

#[tokio::test]
async fn bit_string_round_trips_through_a_remote_call() {
    let mut factory = NodeFactory::new("127.0.0.1", 0);

    let rs = random_bit_string(2);
    let returned = rs.clone();
    let (addr, _) = factory
        .new_node(move |_addr, _dispatcher| {
            let mut registry: MethodRegistry<()> = MethodRegistry::new();
            registry.register("rs", move |_state, _args| wire::encode(&returned));
            ((), registry)
        })
        .await
        .unwrap();

    let fetched: skipplus::bitstring::BitString =
        factory.dispatcher().call_remote(addr, "rs", ()).await.unwrap();
    assert_eq!(fetched, rs);

    factory.shutdown().await.unwrap();
}
