pub mod codec;     // CR-terminated response splitting
pub mod demo;      // Synthetic readings for demo mode
pub mod frame;     // Request/response framing and checksums
pub mod parser;    // QMOD / QPIGS payload parsing
pub mod poller;    // Background polling loop
pub mod store;     // Shared latest-readings store
pub mod transport; // Serial byte pipe
