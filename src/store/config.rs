use super::{ConnectOptions, Engine};

pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_lowercase().as_str() {
        "mongo" | "mongodb" | "cosmos" => Some(Engine::Mongo),
        #[cfg(any(test, feature = "store-mock"))]
        "mock" => Some(Engine::Mock),
        _ => None,
    }
}

pub fn parse_connect_kv(pairs: &[String]) -> ConnectOptions {
    let mut opts = ConnectOptions::default();
    for p in pairs {
        if let Some((k, v)) = p.split_once('=') {
            opts.params.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    opts
}
