//! 任务处理器：天气 / 汇率 / 新闻，以及数据源抽象与统一执行器

pub mod exchange;
pub mod executor;
pub mod news;
pub mod provider;
pub mod registry;
pub mod weather;

pub use exchange::ExchangeHandler;
pub use executor::{crashed, run_handler, HandlerExecutor};
pub use news::NewsHandler;
pub use provider::{DataProvider, FetchRequest, HttpProvider, ProviderResponse, StaticProvider};
pub use registry::{HandlerRegistry, TaskHandler};
pub use weather::WeatherHandler;
