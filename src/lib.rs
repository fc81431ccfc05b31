//! BLE toolbox core: glucose record retrieval over RACP and Nordic UART
//! command macros, independent of any particular Bluetooth stack.

pub mod domain;
pub mod infrastructure;
