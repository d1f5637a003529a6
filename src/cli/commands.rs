use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "ferrocoin", about = "A peer-to-peer cryptocurrency node")]
pub struct Opt {
    /// Address of a peer to connect to; leave unset to start a new network
    #[arg(long, value_name = "HOST:PORT")]
    pub connect: Option<String>,

    /// Listening address for inbound peers
    #[arg(long, value_name = "HOST:PORT", default_value = "127.0.0.1:0")]
    pub listen: String,

    /// Print diagnostic logs to the terminal
    #[arg(long)]
    pub verbose: bool,
}
