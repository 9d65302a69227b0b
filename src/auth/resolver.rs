use crate::auth::types::{AuthScheme, AuthSource, ResolvedAuth};
use crate::model::{ApiDefinition, AuthDescriptor, AuthType, CredentialKind, CredentialSet, GlobalCredential};
use crate::variable::{VariableLayer, VariableMap, VariableResolver, VariableStore};
use crate::variable::store::stringify;
use crate::{Result, RucaseError};
use tracing::debug;

/// 运行时被视为动态 token 的变量名（按顺序查找）
pub const DYNAMIC_TOKEN_KEYS: [&str; 3] = ["token", "access_token", "auth_token"];

/// 认证解析器
///
/// 判定顺序（先命中先用）:
/// 1. API 显式声明的认证
/// 2. 运行时提取到的动态 token，沿用当前全局凭据的方案，缺省 Bearer
/// 3. 当前生效的全局凭据
/// 4. 无认证
pub struct AuthResolver<'a> {
    credentials: &'a CredentialSet,
}

impl<'a> AuthResolver<'a> {
    pub fn new(credentials: &'a CredentialSet) -> Self {
        Self { credentials }
    }

    pub fn resolve(&self, api: &ApiDefinition, store: &VariableStore) -> Result<Option<ResolvedAuth>> {
        let vars = store.flatten();

        if let Some(descriptor) = &api.auth {
            let resolved = Self::resolve_descriptor(descriptor, &vars)?;
            debug!(api = %api.id, "Using auth declared on API definition");
            return Ok(Some(resolved));
        }

        let active = self.credentials.active();

        if let Some((key, token)) = self.dynamic_token(store, &vars) {
            debug!(variable = key, "Using dynamically extracted token");
            let scheme = active
                .map(Self::credential_scheme)
                .unwrap_or(AuthScheme::Bearer);
            return Ok(Some(ResolvedAuth {
                scheme,
                credential: token,
                source: AuthSource::DynamicToken(key.to_string()),
            }));
        }

        if let Some(credential) = active {
            debug!(credential = %credential.id, "Falling back to global credential");
            return Ok(Some(ResolvedAuth {
                scheme: Self::credential_scheme(credential),
                credential: VariableResolver::substitute(&credential.value, &vars),
                source: AuthSource::GlobalCredential(credential.id.clone()),
            }));
        }

        Ok(None)
    }

    /// 当前生效凭据自带的变量，注入变量存储的凭据层
    pub fn credential_variables(&self) -> VariableMap {
        self.credentials
            .active()
            .map(|c| c.variables.clone())
            .unwrap_or_default()
    }

    /// 运行时层中的 token，且不同于静态注入的环境值与全局凭据值
    fn dynamic_token(&self, store: &VariableStore, vars: &VariableMap) -> Option<(&'static str, String)> {
        let static_values: Vec<String> = self
            .credentials
            .iter_active()
            .map(|c| VariableResolver::substitute(&c.value, vars))
            .collect();

        DYNAMIC_TOKEN_KEYS.iter().find_map(|key| {
            let value = store.layer(VariableLayer::Runtime).get(*key).map(stringify)?;
            if value.is_empty() {
                return None;
            }
            let env_value = store.layer(VariableLayer::Environment).get(*key).map(stringify);
            if env_value.as_deref() == Some(value.as_str()) || static_values.contains(&value) {
                return None;
            }
            Some((*key, value))
        })
    }

    fn credential_scheme(credential: &GlobalCredential) -> AuthScheme {
        match credential.kind {
            CredentialKind::Bearer => AuthScheme::Bearer,
            CredentialKind::Token => AuthScheme::Token,
            CredentialKind::CustomHeader => AuthScheme::CustomHeader {
                header_name: credential
                    .header_name
                    .clone()
                    .unwrap_or_else(|| "Authorization".to_string()),
                prefix: credential.prefix().map(str::to_string),
            },
        }
    }

    fn resolve_descriptor(descriptor: &AuthDescriptor, vars: &VariableMap) -> Result<ResolvedAuth> {
        let field = |key: &str| -> Option<String> {
            descriptor
                .get(key)
                .map(|v| VariableResolver::substitute(v, vars))
        };
        let required = |key: &str| -> Result<String> {
            field(key).ok_or_else(|| {
                RucaseError::Configuration(format!(
                    "Auth config for {:?} is missing `{}`",
                    descriptor.kind, key
                ))
            })
        };

        let (scheme, credential) = match descriptor.kind {
            AuthType::Bearer => (AuthScheme::Bearer, required("token")?),
            AuthType::Token => (AuthScheme::Token, required("token")?),
            AuthType::Basic => (
                AuthScheme::Basic,
                format!("{}:{}", required("username")?, field("password").unwrap_or_default()),
            ),
            AuthType::CustomHeader | AuthType::ApiKey => {
                let is_custom = descriptor.kind == AuthType::CustomHeader;
                let header_name = field("header_name")
                    .or_else(|| field("key"))
                    .or_else(|| is_custom.then(|| "Authorization".to_string()))
                    .ok_or_else(|| {
                        RucaseError::Configuration(format!(
                            "Auth config for {:?} is missing `header_name`",
                            descriptor.kind
                        ))
                    })?;
                let value = field("value").or_else(|| field("token")).ok_or_else(|| {
                    RucaseError::Configuration(format!(
                        "Auth config for {:?} is missing `value`",
                        descriptor.kind
                    ))
                })?;
                (
                    AuthScheme::CustomHeader {
                        header_name,
                        // custom_header 缺省 Bearer 前缀，api_key 缺省不加
                        prefix: match descriptor.get("format") {
                            Some(f) => Some(f.to_string()),
                            None => is_custom.then(|| "Bearer".to_string()),
                        },
                    },
                    value,
                )
            }
        };

        Ok(ResolvedAuth {
            scheme,
            credential,
            source: AuthSource::ApiDefinition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::Method;
    use std::collections::BTreeMap;

    fn api() -> ApiDefinition {
        ApiDefinition::new("a", Method::Get, "/me")
    }

    fn token_credential(id: &str, value: &str) -> GlobalCredential {
        let mut c = GlobalCredential::bearer(id, value);
        c.kind = CredentialKind::Token;
        c
    }

    #[test]
    fn test_explicit_auth_beats_dynamic_token() {
        let api = api().with_auth(AuthDescriptor::bearer("${static_token}"));
        let mut store = VariableStore::new();
        store.insert(VariableLayer::Environment, "static_token", "explicit");
        store.set("token", "dynamic");

        let credentials = CredentialSet::new();
        let resolved = AuthResolver::new(&credentials)
            .resolve(&api, &store)
            .unwrap()
            .unwrap();

        assert_eq!(resolved.source, AuthSource::ApiDefinition);
        assert_eq!(resolved.credential, "explicit");
        assert_eq!(resolved.scheme, AuthScheme::Bearer);
    }

    #[test]
    fn test_dynamic_token_uses_global_scheme() {
        let credentials =
            CredentialSet::from_vec(vec![token_credential("g", "static").as_default()]).unwrap();
        let mut store = VariableStore::new();
        store.set("token", "extracted-123");

        let resolved = AuthResolver::new(&credentials)
            .resolve(&api(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.scheme, AuthScheme::Token);
        assert_eq!(resolved.credential, "extracted-123");
        assert_eq!(resolved.source, AuthSource::DynamicToken("token".to_string()));
    }

    #[test]
    fn test_dynamic_token_defaults_to_bearer() {
        let credentials = CredentialSet::new();
        let mut store = VariableStore::new();
        store.set("access_token", "xyz");

        let resolved = AuthResolver::new(&credentials)
            .resolve(&api(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.header().1, "Bearer xyz");
    }

    #[test]
    fn test_static_values_are_not_dynamic() {
        let credentials =
            CredentialSet::from_vec(vec![GlobalCredential::bearer("g", "global-secret")]).unwrap();
        let mut store = VariableStore::new();
        // 环境注入的 token 在套件里会被带入运行时层，不算动态
        store.insert(VariableLayer::Environment, "token", "env-token");
        store.set("token", "env-token");

        let resolved = AuthResolver::new(&credentials)
            .resolve(&api(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.source, AuthSource::GlobalCredential("g".to_string()));
        assert_eq!(resolved.credential, "global-secret");

        // 与全局凭据值相同也不算动态
        let mut store = VariableStore::new();
        store.set("token", "global-secret");
        let resolved = AuthResolver::new(&credentials)
            .resolve(&api(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.source, AuthSource::GlobalCredential("g".to_string()));
    }

    #[test]
    fn test_global_credential_is_templated() {
        let mut custom = GlobalCredential::bearer("k", "${api_key}");
        custom.kind = CredentialKind::CustomHeader;
        custom.header_name = Some("X-Api-Key".to_string());
        let credentials = CredentialSet::from_vec(vec![custom]).unwrap();

        let mut store = VariableStore::new();
        store.insert(VariableLayer::Environment, "api_key", "secret");

        let resolved = AuthResolver::new(&credentials)
            .resolve(&api(), &store)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.header(), ("X-Api-Key".to_string(), "Bearer secret".to_string()));
    }

    #[test]
    fn test_credential_variables_come_from_active_credential() {
        let mut custom = GlobalCredential::bearer("k", "${api_key}").with_variable("api_key", "from-credential");
        custom.kind = CredentialKind::CustomHeader;
        custom.header_name = Some("X-Api-Key".to_string());
        custom.format = Some(String::new());
        let other = GlobalCredential::bearer("other", "x").with_variable("unused", "1");
        let credentials = CredentialSet::from_vec(vec![custom.as_default(), other]).unwrap();

        let resolver = AuthResolver::new(&credentials);
        let vars = resolver.credential_variables();
        assert_eq!(vars.len(), 1);

        let mut store = VariableStore::new();
        store.extend(VariableLayer::Credential, &vars);
        let resolved = resolver.resolve(&api(), &store).unwrap().unwrap();
        assert_eq!(resolved.header(), ("X-Api-Key".to_string(), "from-credential".to_string()));
    }

    #[test]
    fn test_custom_header_descriptor_defaults() {
        let mut config = BTreeMap::new();
        config.insert("token".to_string(), "abc".to_string());
        let custom = api().with_auth(AuthDescriptor {
            kind: AuthType::CustomHeader,
            config: config.clone(),
        });
        let credentials = CredentialSet::new();
        let resolver = AuthResolver::new(&credentials);
        let resolved = resolver.resolve(&custom, &VariableStore::new()).unwrap().unwrap();
        assert_eq!(resolved.header(), ("Authorization".to_string(), "Bearer abc".to_string()));

        config.insert("format".to_string(), String::new());
        config.insert("header_name".to_string(), "X-Token".to_string());
        let raw = api().with_auth(AuthDescriptor {
            kind: AuthType::CustomHeader,
            config,
        });
        let resolved = resolver.resolve(&raw, &VariableStore::new()).unwrap().unwrap();
        assert_eq!(resolved.header(), ("X-Token".to_string(), "abc".to_string()));
    }

    #[test]
    fn test_no_credentials_is_unauthenticated() {
        let credentials = CredentialSet::new();
        let resolved = AuthResolver::new(&credentials)
            .resolve(&api(), &VariableStore::new())
            .unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_basic_and_missing_fields() {
        let mut config = BTreeMap::new();
        config.insert("username".to_string(), "${user}".to_string());
        config.insert("password".to_string(), "pw".to_string());
        let api_basic = api().with_auth(AuthDescriptor {
            kind: AuthType::Basic,
            config,
        });
        let mut store = VariableStore::new();
        store.insert(VariableLayer::Case, "user", "bob");

        let credentials = CredentialSet::new();
        let resolver = AuthResolver::new(&credentials);
        let resolved = resolver.resolve(&api_basic, &store).unwrap().unwrap();
        assert_eq!(resolved.credential, "bob:pw");

        let api_broken = api().with_auth(AuthDescriptor {
            kind: AuthType::Bearer,
            config: BTreeMap::new(),
        });
        assert!(matches!(
            resolver.resolve(&api_broken, &store),
            Err(RucaseError::Configuration(_))
        ));
    }
}
