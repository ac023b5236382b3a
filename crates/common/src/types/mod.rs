use serde::Serialize;
use serde_json::value::RawValue;

/// JSON envelope wrapping every structured response: `{"status":200,"data":"found"}`.
#[derive(Serialize, Debug)]
pub struct Envelope<'a> {
    pub status: u16,
    pub data: &'a str,
}

/// Envelope variant whose `data` is embedded as-is because it already is JSON.
#[derive(Serialize, Debug)]
pub struct RawEnvelope<'a> {
    pub status: u16,
    pub data: &'a RawValue,
}
