//! Integration tests: the real coordinator, recognizer, engine and
//! executor driven by an in-memory device.

mod mock_device;
mod scenarios;
