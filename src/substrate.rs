//! The noisy datagram substrate: every higher layer must tolerate it
//! rather than work around it. On send, it independently decides to drop,
//! corrupt, or delay each outgoing datagram according to `Config`'s
//! fault-injection knobs before handing it to a real `UdpSocket`.

use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

use log::{trace, warn};
use rand::Rng;

use crate::address::Address;
use crate::config::Config;

/// Sends `bytes` to `dst` over `socket`, probabilistically dropping,
/// corrupting, or delaying the datagram first. Consumed by
/// `UdpSimulated::send` and never called directly by any other layer.
pub fn send_noisy(socket: &UdpSocket, dst: Address, bytes: Vec<u8>, config: &Config) {
    let mut rng = rand::thread_rng();

    if rng.gen::<f64>() < config.loss_probability {
        trace!("substrate: dropped datagram to {}", dst);
        return;
    }

    let mut bytes = bytes;
    if rng.gen::<f64>() < config.corrupt_probability && !bytes.is_empty() {
        let i = rng.gen_range(0..bytes.len());
        bytes[i] ^= 0xFF;
        trace!("substrate: corrupted datagram to {}", dst);
    }

    let delay_ms = if config.max_delay_ms > 0 {
        rng.gen_range(0..=config.max_delay_ms)
    } else {
        0
    };

    let socket = socket.try_clone().expect("socket clone for noisy send");
    let dst: std::net::SocketAddr = dst.into();
    if delay_ms == 0 {
        if let Err(e) = socket.send_to(&bytes, dst) {
            warn!("substrate: send_to {} failed: {}", dst, e);
        }
    } else {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            if let Err(e) = socket.send_to(&bytes, dst) {
                warn!("substrate: delayed send_to {} failed: {}", dst, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn loss_probability_one_drops_every_datagram() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut config = Config::default();
        config.loss_probability = 1.0;
        // A receiver that should never see anything.
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let dst = Address::new(Ipv4Addr::new(127, 0, 0, 1), receiver.local_addr().unwrap().port());
        send_noisy(&socket, dst, vec![1, 2, 3], &config);
        let mut buf = [0u8; 16];
        assert!(receiver.recv_from(&mut buf).is_err());
    }
}
