//! photomux - Live Photo to Motion Photo converter
//!
//! Pairs the still and video halves of live photos, concatenates them into a
//! single Motion Photo file and writes the XMP tags that let galleries play
//! the embedded clip. Metadata is read and written through exiftool.

pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod identity;
pub mod media;
pub mod metadata;
pub mod muxer;
pub mod progress;
pub mod transcode;
pub mod workflow;
pub mod writer;
