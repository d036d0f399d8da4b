#![forbid(unsafe_code)]

//! Codecs for patching a Chromium-based browser install: resource paks, CRX
//! extension packages and protected preference codes.

pub mod config;
pub mod crx;
pub mod pak;
pub mod prefs;

mod fsutil;
