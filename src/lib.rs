pub mod addr;
pub mod net;
pub mod proto;
pub mod sim;
pub mod socket;
pub mod topo;
pub mod trace;
pub mod wire;

#[cfg(test)]
mod test;
