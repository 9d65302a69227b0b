/// 认证解析 - 决定请求携带哪一份凭据
mod resolver;
mod types;

pub use resolver::{AuthResolver, DYNAMIC_TOKEN_KEYS};
pub use types::{AuthScheme, AuthSource, ResolvedAuth};
