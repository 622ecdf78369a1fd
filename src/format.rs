use std::{collections::BTreeSet, path::Path};

use chrono::{DateTime, Local, Utc};
use humansize::DECIMAL;
use itertools::Itertools;

use crate::peer::PeerId;

pub fn format_path(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    snailquote::escape(&path_str).into_owned()
}

pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, DECIMAL)
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn format_peers(peers: &BTreeSet<PeerId>) -> String {
    if peers.is_empty() {
        "none".to_owned()
    } else {
        peers.iter().join(", ")
    }
}
