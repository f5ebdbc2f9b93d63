//! Concrete scenarios 4 and 5: two-node mutual convergence via `linearise`
//! plus periodic `timeout` firing, and the sole-far-neighbour retain case.

use std::collections::HashSet;
use std::time::Duration;

use skipplus::bitstring::BitString;
use skipplus::factory::NodeFactory;
use skipplus::reference::SkipReference;
use skipplus::skip::{self, SkipState};

/// A 16-bit rs whose leading byte is `byte`, trailing bits zero — enough to
/// order two references deterministically without hand-deriving full bit
/// patterns.
fn rs(byte: u8) -> BitString {
    let mut bits = vec![false; 16];
    for (i, bit) in bits.iter_mut().take(8).enumerate() {
        *bit = (byte >> (7 - i)) & 1 != 0;
    }
    BitString::from_bits(bits)
}

#[tokio::test]
async fn two_node_linearise_converges_both_directions() {
    let mut factory =
        NodeFactory::new("127.0.0.1", 0).with_timeout_interval(Duration::from_millis(50));

    let a_rs = rs(10);
    let b_rs = rs(200);
    assert!(a_rs < b_rs);

    let (a_addr, _) = factory
        .new_node({
            let a_rs = a_rs.clone();
            move |addr, dispatcher| {
                let reference = SkipReference::new(addr.ip().to_string(), addr.port(), a_rs);
                (SkipState::new(reference, dispatcher.clone()), skip::registry())
            }
        })
        .await
        .unwrap();
    let (b_addr, _) = factory
        .new_node({
            let b_rs = b_rs.clone();
            move |addr, dispatcher| {
                let reference = SkipReference::new(addr.ip().to_string(), addr.port(), b_rs);
                (SkipState::new(reference, dispatcher.clone()), skip::registry())
            }
        })
        .await
        .unwrap();

    let a_reference = SkipReference::new("127.0.0.1", a_addr.port(), a_rs);
    let b_reference = SkipReference::new("127.0.0.1", b_addr.port(), b_rs);

    factory
        .dispatcher()
        .call_remote::<SkipReference, ()>(a_addr, "linearise", b_reference.clone())
        .await
        .unwrap();

    // let several timeout firings run so `a`'s chain step calls
    // `b.linearise(a.reference)` back.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let a_neighbours: HashSet<SkipReference> = factory
        .dispatcher()
        .call_remote(a_addr, "neighbours", ())
        .await
        .unwrap();
    assert!(a_neighbours.contains(&b_reference));

    let b_neighbours: HashSet<SkipReference> = factory
        .dispatcher()
        .call_remote(b_addr, "neighbours", ())
        .await
        .unwrap();
    assert!(b_neighbours.contains(&a_reference));

    factory.shutdown().await.unwrap();
}

#[tokio::test]
async fn sole_far_neighbour_is_retained_in_n() {
    let mut factory = NodeFactory::new("127.0.0.1", 0);
    let a_rs = rs(1);
    let u_rs = rs(250);

    let (a_addr, _) = factory
        .new_node({
            let a_rs = a_rs.clone();
            move |addr, dispatcher| {
                let reference = SkipReference::new(addr.ip().to_string(), addr.port(), a_rs);
                (SkipState::new(reference, dispatcher.clone()), skip::registry())
            }
        })
        .await
        .unwrap();

    let u_reference = SkipReference::new("127.0.0.1", 9999, u_rs);
    factory
        .dispatcher()
        .call_remote::<SkipReference, ()>(a_addr, "linearise", u_reference.clone())
        .await
        .unwrap();

    let a_neighbours: HashSet<SkipReference> = factory
        .dispatcher()
        .call_remote(a_addr, "neighbours", ())
        .await
        .unwrap();
    let mut expected = HashSet::new();
    expected.insert(u_reference);
    assert_eq!(a_neighbours, expected);

    factory.shutdown().await.unwrap();
}
