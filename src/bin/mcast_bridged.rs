//! Demo daemon wiring `BridgeConfig`-driven IGMP and MLD control-plane
//! subsystems onto real interfaces, one OS thread each (§5, §6). Config-file
//! parsing and the data-plane forwarding loop are out of scope (§1); this
//! binary stands in with `getopts` flags and starts only the two control
//! threads.

use std::net::Ipv4Addr;
use std::process;
use std::thread;

use getopts::Options;
use log::error;

use mcast_bridge_core::capture::LinuxRawSocket;
use mcast_bridge_core::wire::ethernet::EthernetAddress;
use mcast_bridge_core::{BridgeConfig, Igmp, Mld, QuerierMode, Subsystem};

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {program} [options] IFNAME");
    print!("{}", opts.usage(&brief));
}

fn parse_mode(s: &str) -> Option<QuerierMode> {
    match s {
        "never" => Some(QuerierMode::Never),
        "quick" => Some(QuerierMode::Quick),
        "delay" => Some(QuerierMode::Delay),
        "defer" => Some(QuerierMode::Defer),
        _ => None,
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("", "igmp-mode", "IGMP querier mode (never/quick/delay/defer)", "MODE");
    opts.optopt("", "mld-mode", "MLD querier mode (never/quick/delay/defer)", "MODE");
    opts.optopt("", "local-ipv4", "local IPv4 address to source queries from", "ADDR");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            process::exit(2);
        }
    };

    if matches.opt_present("h") || matches.free.is_empty() {
        print_usage(&program, &opts);
        process::exit(if matches.opt_present("h") { 0 } else { 2 });
    }

    let ifname = matches.free[0].clone();

    let mut config = BridgeConfig::default();
    if let Some(mode) = matches.opt_str("igmp-mode").and_then(|s| parse_mode(&s)) {
        config.igmp_querier_mode = mode;
    }
    if let Some(mode) = matches.opt_str("mld-mode").and_then(|s| parse_mode(&s)) {
        config.mld_querier_mode = mode;
    }
    let local_ipv4: Ipv4Addr = matches
        .opt_str("local-ipv4")
        .and_then(|s| s.parse().ok())
        .unwrap_or(Ipv4Addr::UNSPECIFIED);

    let local_mac = EthernetAddress([0, 0, 0, 0, 0, 0]);

    let igmp_io = LinuxRawSocket::new(&ifname, &[]).unwrap_or_else(|e| {
        error!("failed to open IGMP capture socket on {ifname}: {e}");
        process::exit(1);
    });
    let mut igmp_subsystem: Subsystem<Igmp, LinuxRawSocket> = Subsystem::new(
        config.igmp_querier_mode,
        local_ipv4,
        local_mac,
        igmp_io,
        config.dynamic_group_capacity,
    );

    let mld_io = LinuxRawSocket::new(&ifname, &[]).unwrap_or_else(|e| {
        error!("failed to open MLD capture socket on {ifname}: {e}");
        process::exit(1);
    });
    let mut mld_subsystem: Subsystem<Mld, LinuxRawSocket> = Subsystem::new(
        config.mld_querier_mode,
        core::net::Ipv6Addr::UNSPECIFIED,
        local_mac,
        mld_io,
        config.dynamic_group_capacity,
    );

    let max_timers = config.max_timers;
    let igmp_thread = thread::Builder::new()
        .name("igmp-control".into())
        .spawn(move || igmp_subsystem.run(max_timers))
        .expect("failed to spawn IGMP control thread");
    let mld_thread = thread::Builder::new()
        .name("mld-control".into())
        .spawn(move || mld_subsystem.run(max_timers))
        .expect("failed to spawn MLD control thread");

    igmp_thread.join().expect("IGMP control thread panicked");
    mld_thread.join().expect("MLD control thread panicked");
}
