pub mod signal_gateway;
