//! 应用层（livesync-application）
//!
//! - 组合根 `StoreRegistry`：每种实体类型一个集合存储，显式传递而非全局单例
//! - 命令与命令总线：`Command` / `CommandHandler` / `InMemoryCommandBus`
//! - 用例处理器（`handlers`）：报名、入队申请与审批、评论、点赞
//!
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod context;
pub mod error;
pub mod handlers;
pub mod inmemory_command_bus;
pub mod registry;

pub use inmemory_command_bus::InMemoryCommandBus;
pub use registry::StoreRegistry;
