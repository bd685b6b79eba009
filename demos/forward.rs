//! A two-port IPv4 router over Linux TAP devices.
//!
//! Creates (or attaches to) two TAP interfaces and forwards datagrams
//! between the networks behind them, resolving next hops over ARP.
//!
//!     cargo run --example forward -- --left tap0 --right tap1
//!
//! The TAP devices must exist and be configured, e.g.:
//!
//!     ip tuntap add dev tap0 mode tap user $USER
//!     ip addr add 10.0.0.2/24 dev tap0 && ip link set up dev tap0

use std::cell::RefCell;
use std::process::exit;
use std::rc::Rc;
use std::str::FromStr;

use getopts::Options;

use tinytcp::iface::{Config, Interface, Router};
use tinytcp::phy::TunTapPort;
use tinytcp::time::Duration;
use tinytcp::wire::{EthernetAddress, Ipv4Address};

const POLL_INTERVAL_MS: u64 = 2;

struct Side {
    tap: String,
    addr: Ipv4Address,
    prefix_len: u8,
}

fn parse_side(matches: &getopts::Matches, opt: &str, default_addr: &str) -> Side {
    let tap = matches.opt_str(opt).unwrap_or_else(|| {
        eprintln!("missing --{opt} TAP device name");
        exit(1);
    });
    let cidr = matches
        .opt_str(&format!("{opt}-addr"))
        .unwrap_or_else(|| default_addr.to_string());
    let (addr, prefix_len) = match cidr.split_once('/') {
        Some((addr, len)) => (
            Ipv4Address::from_str(addr).expect("malformed address"),
            len.parse().expect("malformed prefix length"),
        ),
        None => (Ipv4Address::from_str(&cidr).expect("malformed address"), 24),
    };
    Side {
        tap,
        addr,
        prefix_len,
    }
}

fn network(addr: Ipv4Address, prefix_len: u8) -> Ipv4Address {
    let mask = if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - prefix_len)
    };
    Ipv4Address::from_bits(addr.to_bits() & mask)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options::new();
    opts.optopt("", "left", "TAP device of the left network", "NAME");
    opts.optopt("", "right", "TAP device of the right network", "NAME");
    opts.optopt("", "left-addr", "router address on the left (default 10.0.0.1/24)", "A.B.C.D/LEN");
    opts.optopt("", "right-addr", "router address on the right (default 10.0.1.1/24)", "A.B.C.D/LEN");
    opts.optflag("h", "help", "print this help");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(err) => {
            eprintln!("{err}");
            exit(1);
        }
    };
    if matches.opt_present("h") {
        print!("{}", opts.usage(&format!("Usage: {} [options]", args[0])));
        return;
    }

    let sides = [
        parse_side(&matches, "left", "10.0.0.1/24"),
        parse_side(&matches, "right", "10.0.1.1/24"),
    ];

    let mut router = Router::new();
    let mut ports = Vec::new();
    for (n, side) in sides.iter().enumerate() {
        let port = Rc::new(RefCell::new(
            TunTapPort::new(&side.tap).expect("failed to attach TAP device"),
        ));
        let hardware_addr = EthernetAddress([0x02, 0x00, 0x00, 0x00, rand::random(), n as u8 + 1]);
        let index = router.add_interface(Interface::new(
            Config::new(hardware_addr, side.addr),
            port.clone(),
        ));
        router.add_route(network(side.addr, side.prefix_len), side.prefix_len, None, index);
        println!(
            "{}: {} is {} ({})",
            index, side.tap, side.addr, hardware_addr
        );
        ports.push(port);
    }

    let mut buffer = vec![0; 65535];
    loop {
        for (index, port) in ports.iter().enumerate() {
            loop {
                let len = match port.borrow_mut().recv(&mut buffer) {
                    Ok(len) => len,
                    Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        eprintln!("{}: read error: {err}", sides[index].tap);
                        exit(1);
                    }
                };
                router.interface_mut(index).process_frame(&buffer[..len]);
            }
        }
        router.route();
        router.tick(Duration::from_millis(POLL_INTERVAL_MS));
        std::thread::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS));
    }
}
