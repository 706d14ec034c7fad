mod addr;
mod config;
mod lan;
mod routed;
mod sim_time;
mod simulator;
mod wire;
