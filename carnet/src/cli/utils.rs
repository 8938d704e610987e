use anyhow::{anyhow, Result};
use chrono::{Local, LocalResult, NaiveDate, TimeZone};
use clap::ArgMatches;

/// Render a unix millisecond timestamp in local time
pub fn timestamp_to_string(tm: i64) -> String {
    match Local.timestamp_millis_opt(tm) {
        LocalResult::None => "".to_string(),
        LocalResult::Single(v) => v.format("%Y-%m-%d %H:%M:%S").to_string(),
        LocalResult::Ambiguous(v1, v2) => format!("{}, {}", v1, v2),
    }
}

pub fn opt_timestamp_to_string(tm: Option<i64>) -> String {
    tm.map(timestamp_to_string).unwrap_or_default()
}

pub fn short_msg(msg: String, len: usize) -> String {
    if msg.chars().count() > len {
        let mut pre_msg: String = msg.chars().take(len).collect();
        pre_msg.push_str("...");
        pre_msg
    } else {
        msg
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow!("invalid date {}, expect YYYY-MM-DD: {}", value, e))
}

pub fn get_url(sub_m: &ArgMatches) -> Result<String> {
    sub_m
        .get_one::<String>("url")
        .cloned()
        .map(|url| {
            if url.starts_with("http://") || url.starts_with("https://") {
                url
            } else {
                format!("http://{}", url)
            }
        })
        .ok_or_else(|| anyhow!("url flag not found"))
}

pub fn get_actor(sub_m: &ArgMatches) -> Option<String> {
    sub_m
        .get_one::<String>("actor")
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

pub fn get_arg(sub_m: &ArgMatches, name: &str) -> Result<String> {
    sub_m
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow!("{} argument not found", name))
}
