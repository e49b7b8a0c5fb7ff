// 工具函数模块
// 包含加密、凭证解析、金额换算等通用工具

pub mod credentials;
pub mod crypto;
pub mod money;

// 重新导出常用函数
pub use credentials::*;
pub use crypto::*;
pub use money::*;
