// 服务层模块
// 包含所有业务逻辑服务

pub mod gateway_client;
pub mod order_service;
pub mod pay_service;

// 重新导出服务
pub use gateway_client::GatewayClient;
pub use order_service::OrderService;
pub use pay_service::PayService;
