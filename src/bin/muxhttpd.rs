use muxhttpd::{Config, Result, Server};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let source = std::fs::read_to_string(&path)
        .unwrap_or_else(|_| {
            proxy_log::warn!("no config at {}, starting from defaults", path);
            String::new()
        });

    let config = Config::from_str(&source)?;
    let mut server = Server::bind(config)?;
    server.run()
}
