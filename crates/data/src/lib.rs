//! Remote data access: the dashboard's REST API, OKX market history and
//! CSV export of candle series.

pub mod csv_export;
pub mod http;
pub mod okx;

pub use csv_export::{write_candles_to_csv, ExportError};
pub use http::{HttpGateway, HttpGatewayConfig, DEFAULT_BASE_URL};
pub use okx::{OkxCandleFetcher, OkxConfig, OKX_BASE_URL};
