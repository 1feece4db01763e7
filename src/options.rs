use clap::Parser;

/// Voltronic Bridge - polls a solar inverter over RS232 and publishes its status
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Publish synthetic data instead of polling the inverter
    #[clap(short = 'd', long = "demo")]
    pub demo: bool,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
