//! DHCP 网段仿真
//!
//! 路由器运行 DHCP server，若干主机在未配置的接口上启用 DHCP client。

use clap::Parser;
use lansim_rs::addr::{Ipv4Address, MacAddr, Prefix, Subnet};
use lansim_rs::net::NetWorld;
use lansim_rs::sim::{SimConfig, SimTime, Simulator};
use lansim_rs::topo::{build_dhcp_lan, DhcpLanOpts};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dhcp_lan", about = "DHCP 仿真：一台 server，若干 client")]
struct Args {
    /// client 数量
    #[arg(long, default_value_t = 2)]
    clients: usize,
    /// 仿真配置文件（JSON）
    #[arg(long)]
    config: Option<PathBuf>,
    /// 仿真运行到多少毫秒
    #[arg(long, default_value_t = 30_000)]
    until_ms: u64,
    /// 输出 client 绑定结果 JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ClientBinding {
    client: String,
    iface: MacAddr,
    addr: Option<Ipv4Address>,
    prefix: Option<Prefix>,
    gateway: Option<Ipv4Address>,
    dhcp_enabled: bool,
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
    let mut world = NetWorld::new(cfg);
    let opts = DhcpLanOpts {
        clients: args.clients,
        ..DhcpLanOpts::default()
    };
    let t = build_dhcp_lan(&mut world, &opts);

    world.net.enable_dhcp_server(t.router, &mut sim);
    for &iface in &t.client_ifaces {
        world.net.enable_dhcp_client(iface, &mut sim);
    }
    sim.run_until(SimTime::from_millis(args.until_ms), &mut world);

    let mut out = Vec::with_capacity(t.clients.len());
    for (&dev, &iface) in t.clients.iter().zip(&t.client_ifaces) {
        let info = world.net.interface_info(iface);
        let addr = info.addr.filter(|a| !a.is_unspecified());
        let gateway = world
            .net
            .routes(dev)
            .into_iter()
            .find(|r| r.destination == Subnet::default_route())
            .map(|r| r.next_hop);
        let b = ClientBinding {
            client: world.net.device_name(dev).to_string(),
            iface,
            addr,
            prefix: addr.and(info.prefix),
            gateway,
            dhcp_enabled: world.net.dhcp_client_enabled(iface),
        };
        println!(
            "dhcp_binding client={} iface={} addr={} prefix={} gateway={} dhcp_enabled={}",
            b.client,
            b.iface,
            b.addr.map_or("-".to_string(), |a| a.to_string()),
            b.prefix.map_or("-".to_string(), |p| p.len().to_string()),
            b.gateway.map_or("-".to_string(), |g| g.to_string()),
            b.dhcp_enabled
        );
        out.push(b);
    }
    println!(
        "dhcp_server bindings={}",
        world.net.dhcp_bindings(t.router, sim.now()).len()
    );

    if let Some(path) = args.json {
        let json = serde_json::to_string_pretty(&out).expect("serialize bindings");
        fs::write(&path, json).expect("write bindings json");
        eprintln!("wrote bindings to {}", path.display());
    }
}
