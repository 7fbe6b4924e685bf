//! Authentication setup inside the engine context

use crate::context::ScanContext;
use crate::engine::ZapEngine;
use crate::error::Result;
use crate::models::{
    AuthenticationType, BasicLoginConfiguration, SessionManagementType, UserInformation,
};
use tracing::{info, warn};
use url::form_urlencoded::byte_serialize;
use url::Url;

/// Engine authentication method for HTTP basic auth
const HTTP_AUTHENTICATION_METHOD: &str = "httpAuthentication";

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Maps the configured login to the engine calls creating a forced user
pub struct AuthenticationConfigurer<'a> {
    engine: &'a dyn ZapEngine,
    context_name: &'a str,
}

impl<'a> AuthenticationConfigurer<'a> {
    pub fn new(engine: &'a dyn ZapEngine, context_name: &'a str) -> Self {
        Self {
            engine,
            context_name,
        }
    }

    /// Returns the scan user, or `None` when no supported login is configured
    pub async fn configure(
        &self,
        context_id: u32,
        scan_context: &ScanContext,
    ) -> Result<Option<UserInformation>> {
        match scan_context.authentication_type {
            AuthenticationType::None => {
                info!("For scan {}: No authentication was configured", self.context_name);
                Ok(None)
            }
            AuthenticationType::FormBasedAuthentication => {
                info!(
                    "For scan {}: Form based authentication is not supported, continuing unauthenticated",
                    self.context_name
                );
                Ok(None)
            }
            AuthenticationType::HttpBasicAuthentication => {
                let login = scan_context.web_scan.login.as_ref();
                match login.and_then(|l| l.basic.as_ref()) {
                    Some(basic) => self
                        .init_basic_authentication(
                            context_id,
                            &scan_context.target_url,
                            scan_context.session_management_type,
                            basic,
                        )
                        .await
                        .map(Some),
                    None => {
                        warn!(
                            "For scan {}: Basic authentication selected without credentials",
                            self.context_name
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn init_basic_authentication(
        &self,
        context_id: u32,
        target: &Url,
        session_management: SessionManagementType,
        basic: &BasicLoginConfiguration,
    ) -> Result<UserInformation> {
        let realm = basic.realm.as_deref().unwrap_or_default();
        let host = target.host_str().unwrap_or_default();
        let port = target
            .port_or_known_default()
            .map(|p| p.to_string())
            .unwrap_or_default();
        let auth_params = format!(
            "hostname={}&realm={}&port={}",
            encode(host),
            encode(realm),
            encode(&port)
        );

        info!("For scan {}: Setting basic authentication", self.context_name);
        self.engine
            .configure_auth_method(context_id, HTTP_AUTHENTICATION_METHOD, &auth_params)
            .await?;

        // http auth session management is configured without parameters
        self.engine
            .set_session_management_method(
                context_id,
                session_management.zap_session_management_method(),
                None,
            )
            .await?;

        let user_id = self.engine.create_user(context_id, &basic.user).await?;

        info!("For scan {}: Setting up user", self.context_name);
        let credentials = format!(
            "username={}&password={}",
            encode(&basic.user),
            encode(&basic.password)
        );
        self.engine
            .configure_user_credentials(context_id, user_id, &credentials)
            .await?;
        self.engine.set_user_enabled(context_id, user_id, true).await?;
        self.engine.set_forced_user(context_id, user_id).await?;
        self.engine.set_forced_user_mode_enabled(true).await?;

        Ok(UserInformation {
            user_name: basic.user.clone(),
            zap_user_id: user_id,
        })
    }
}
