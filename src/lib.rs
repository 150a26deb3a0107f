//! # sensornode - WiFi sensor node firmware core
//!
//! The portable half of a sensor node that joins a WiFi network through a
//! serial-attached adapter, opens a TCP connection to an MQTT broker, and then
//! publishes a counter-tagged reading every cycle while printing whatever
//! arrives on its subscribed topic. This library is designed for embedded
//! systems and supports `no_std` environments.
//!
//! ## Layout
//!
//! - [`platform`]: the board support boundary. Interrupt controller, UART,
//!   WiFi adapter and socket factories.
//! - [`network`]: byte-stream transport traits the MQTT session runs over.
//! - [`session`]: the messaging session boundary and an MQTT 3.1/3.1.1
//!   implementation working out of caller-owned buffers.
//! - [`node`]: the bring-up sequencer, the steady-state loop, the reading
//!   serializer and the inbound message printer.
//! - [`config`]: compile-time settings.
//! - [`error`]: status codes and stage diagnostics.
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! sensornode = "0.1.0"
//! ```
//!
//! ### Running a node
//!
//! ```rust,ignore
//! use sensornode::config::{BUFF_LEN, Settings};
//! use sensornode::node::{PrintSink, SessionBuffers, run_node};
//!
//! let mut send = [0u8; BUFF_LEN];
//! let mut recv = [0u8; BUFF_LEN];
//! let buffers = SessionBuffers { send: &mut send, recv: &mut recv };
//!
//! // `board` implements `sensornode::platform::Platform`.
//! let code = run_node(&mut board, &Settings::DEFAULT, buffers, Console, &mut PrintSink::new(Console));
//! ```
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt logging support for embedded debugging
//! - `log`: Route diagnostics through the `log` facade instead

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Compile-time configuration.
pub mod config;

/// Status codes and bring-up errors.
pub mod error;

/// Byte-stream transport traits and their error type.
pub mod network;

/// Board support boundary.
pub mod platform;

/// Messaging session boundary and the MQTT client.
pub mod session;

/// Bring-up sequencer, steady-state loop and message handling.
pub mod node;
