//! Diff stream duplication.
//!
//! One forwarder thread writes the same `Arc<Diff>` to two bounded
//! outputs, so the leak and dependency stages each see the full stream.
//! When the source closes, both outputs close; a slow consumer exerts
//! backpressure on the source through the forwarder's blocking sends.

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, select, Receiver};

/// Duplicate `input` into two channels of `capacity` each. The returned
/// handle joins the forwarder; it exits when the input closes, when both
/// outputs are dropped, or on shutdown.
pub(crate) fn duplicate<T: Clone + Send + 'static>(
    input: Receiver<T>,
    capacity: usize,
    dying: Receiver<()>,
) -> (Receiver<T>, Receiver<T>, JoinHandle<()>) {
    let (tx_a, rx_a) = bounded(capacity);
    let (tx_b, rx_b) = bounded(capacity);
    let handle = std::thread::spawn(move || loop {
        select! {
            recv(dying) -> _ => return,
            recv(input) -> item => match item {
                Ok(item) => {
                    if tx_a.send(item.clone()).is_err() || tx_b.send(item).is_err() {
                        return;
                    }
                }
                Err(_) => return,
            },
        }
    });
    (rx_a, rx_b, handle)
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{bounded as cb_bounded, unbounded};
    use std::time::Duration;

    use super::*;

    #[test]
    fn both_outputs_see_every_item() {
        let (tx, rx) = unbounded::<u32>();
        let (_dying_tx, dying_rx) = cb_bounded::<()>(0);
        let (a, b, handle) = duplicate(rx, 8, dying_rx);

        for i in 0..4 {
            tx.send(i).expect("send");
        }
        drop(tx);

        let got_a: Vec<u32> = a.iter().collect();
        let got_b: Vec<u32> = b.iter().collect();
        assert_eq!(got_a, vec![0, 1, 2, 3]);
        assert_eq!(got_b, vec![0, 1, 2, 3]);
        handle.join().expect("forwarder exits");
    }

    #[test]
    fn closing_the_source_closes_both_outputs() {
        let (tx, rx) = unbounded::<u32>();
        let (_dying_tx, dying_rx) = cb_bounded::<()>(0);
        let (a, b, handle) = duplicate(rx, 8, dying_rx);
        drop(tx);
        assert!(a.recv_timeout(Duration::from_secs(1)).is_err());
        assert!(b.recv_timeout(Duration::from_secs(1)).is_err());
        handle.join().expect("forwarder exits");
    }

    #[test]
    fn dropping_both_outputs_stops_the_forwarder() {
        let (tx, rx) = unbounded::<u32>();
        let (_dying_tx, dying_rx) = cb_bounded::<()>(0);
        let (a, b, handle) = duplicate(rx, 1, dying_rx);
        drop(a);
        drop(b);
        // Fill beyond capacity; the forwarder must notice the dead outputs.
        for i in 0..8 {
            let _ = tx.send(i);
        }
        handle.join().expect("forwarder exits");
    }
}
