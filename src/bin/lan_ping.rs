//! LAN ping 仿真
//!
//! 两台主机经交换机互联（`--routed` 时为两个网段经路由器互联），h0 ping h1。

use clap::Parser;
use lansim_rs::net::{NetWorld, PingEvent, PingObserver};
use lansim_rs::sim::{SimConfig, SimTime, Simulator};
use lansim_rs::topo::{build_lan, build_routed, LanOpts};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Parser)]
#[command(name = "lan_ping", about = "LAN 仿真：h0 ping h1")]
struct Args {
    /// echo 次数
    #[arg(long, default_value_t = 4)]
    count: u32,
    /// 使用两个网段 + 路由器的拓扑
    #[arg(long)]
    routed: bool,
    /// 仿真配置文件（JSON）
    #[arg(long)]
    config: Option<PathBuf>,
    /// 输出结构化事件 JSON
    #[arg(long)]
    trace_json: Option<PathBuf>,
    /// 仿真运行到多少毫秒；缺省为 ping 完成所需时间
    #[arg(long)]
    until_ms: Option<u64>,
}

fn main() {
    // 初始化 tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => SimConfig::from_json_file(path).expect("load config"),
        None => SimConfig::default(),
    };

    let mut sim = Simulator::default();
    let mut world = NetWorld::new(cfg.clone());
    if args.trace_json.is_some() {
        world.net.enable_trace();
    }

    let (src, dst) = if args.routed {
        let t = build_routed(&mut world);
        (t.h0, t.h1_addr)
    } else {
        let t = build_lan(&mut world, &LanOpts::default());
        (t.hosts[0], t.host_addrs[1])
    };
    world.net.emit_trace_meta();

    let events: Arc<Mutex<Vec<PingEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let observer: PingObserver = Box::new(move |ev: &PingEvent| {
        sink.lock().expect("events lock").push(ev.clone());
    });
    let ping = world
        .net
        .ping(src, dst, Some(args.count), Some(observer), &mut sim);

    let until = match args.until_ms {
        Some(ms) => SimTime::from_millis(ms),
        None => {
            let rounds = cfg.ping_interval_ms.max(cfg.echo_timeout_ms) * (args.count as u64 + 1);
            SimTime::from_millis(rounds)
        }
    };
    sim.run_until(until, &mut world);

    for ev in events.lock().expect("events lock").iter() {
        if let PingEvent::Echo { seq, result } = ev {
            println!("ping_echo seq={seq} result={}", serde_json::to_string(result).expect("serialize echo result"));
        }
    }
    let summary = world
        .net
        .ping_summary(src, ping)
        .or_else(|| world.net.stop_ping(src, ping))
        .expect("ping summary");
    println!(
        "ping_summary dst={} sent={} received={} lost={} icmp_errors={}",
        summary.dst,
        summary.sent,
        summary.received,
        summary.lost(),
        world.net.stats.icmp_errors
    );

    if let Some(path) = args.trace_json {
        if let Some(log) = &world.net.trace {
            let json = serde_json::to_string_pretty(&log.events).expect("serialize trace events");
            fs::write(&path, json).expect("write trace json");
            eprintln!("wrote trace events to {}", path.display());
        }
    }
}
