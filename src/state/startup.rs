//! Connection startup and authentication.

use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::backend::{
    AuthenticationMessage, BackendKeyData, ErrorResponse, RawMessage, msg_type,
};
use crate::protocol::frontend::auth::{ScramClient, md5_password};
use crate::protocol::frontend::{
    write_password, write_sasl_initial_response, write_sasl_response, write_startup,
};

use super::{Context, State, Transition, unexpected};

const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitingAuth,
    SaslInProgress,
    WaitingAuthResult,
    WaitingReady,
}

/// Startup packet, authentication and the wait for the first ReadyForQuery.
#[derive(Debug)]
pub(crate) struct Startup {
    phase: Phase,
    scram: Option<ScramClient>,
}

impl Startup {
    pub fn new() -> Self {
        Self {
            phase: Phase::WaitingAuth,
            scram: None,
        }
    }

    pub fn enter(&mut self, ctx: &mut Context<'_>) -> Result<Transition> {
        let options = &ctx.session.options;
        let mut params: Vec<(&str, &str)> = vec![
            ("user", options.user.as_str()),
            ("database", options.database.as_str()),
            ("client_encoding", "UTF8"),
        ];
        for (name, value) in &options.params {
            params.push((name.as_str(), value.as_str()));
        }
        write_startup(ctx.out, &params);
        debug!(user = %options.user, database = %options.database, "sent startup packet");
        Ok(Transition::Stay)
    }

    pub fn handle(&mut self, msg: RawMessage<'_>, ctx: &mut Context<'_>) -> Result<Transition> {
        match (msg.type_byte, self.phase) {
            (msg_type::ERROR_RESPONSE, _) => Err(ErrorResponse::parse(msg.payload)?.into_error()),
            (msg_type::AUTHENTICATION, Phase::WaitingAuth) => self.handle_auth(msg.payload, ctx),
            (msg_type::AUTHENTICATION, Phase::SaslInProgress) => {
                self.handle_sasl(msg.payload, ctx)
            }
            (msg_type::AUTHENTICATION, Phase::WaitingAuthResult) => {
                match AuthenticationMessage::parse(msg.payload)? {
                    AuthenticationMessage::Ok => {
                        self.phase = Phase::WaitingReady;
                        Ok(Transition::Stay)
                    }
                    auth => Err(Error::Auth(format!("unexpected auth result: {:?}", auth))),
                }
            }
            (msg_type::BACKEND_KEY_DATA, Phase::WaitingReady) => {
                let key = BackendKeyData::parse(msg.payload)?;
                ctx.session.backend_key = Some((key.process_id(), key.secret()));
                Ok(Transition::Stay)
            }
            (msg_type::READY_FOR_QUERY, Phase::WaitingReady) => {
                debug!("connection ready");
                Ok(Transition::Replace(State::Idle))
            }
            _ => Err(unexpected(msg, "Startup")),
        }
    }

    fn handle_auth(&mut self, payload: &[u8], ctx: &mut Context<'_>) -> Result<Transition> {
        let options = &ctx.session.options;
        match AuthenticationMessage::parse(payload)? {
            AuthenticationMessage::Ok => {
                debug!("authenticated without password");
                self.phase = Phase::WaitingReady;
            }
            AuthenticationMessage::CleartextPassword => {
                debug!("cleartext password requested");
                write_password(ctx.out, password(options.password.as_deref())?);
                self.phase = Phase::WaitingAuthResult;
            }
            AuthenticationMessage::Md5Password { salt } => {
                debug!("md5 password requested");
                let hashed = md5_password(
                    &options.user,
                    password(options.password.as_deref())?,
                    &salt,
                );
                write_password(ctx.out, &hashed);
                self.phase = Phase::WaitingAuthResult;
            }
            AuthenticationMessage::Sasl { mechanisms } => {
                if !mechanisms.contains(&SCRAM_SHA_256) {
                    return Err(Error::Unsupported(format!(
                        "no supported SASL mechanism, server offers {:?}",
                        mechanisms
                    )));
                }
                debug!("starting SCRAM-SHA-256 exchange");
                let scram = ScramClient::new(password(options.password.as_deref())?);
                write_sasl_initial_response(
                    ctx.out,
                    SCRAM_SHA_256,
                    scram.client_first_message().as_bytes(),
                );
                self.scram = Some(scram);
                self.phase = Phase::SaslInProgress;
            }
            auth => {
                return Err(Error::Unsupported(format!(
                    "authentication method {:?}",
                    auth
                )));
            }
        }
        Ok(Transition::Stay)
    }

    fn handle_sasl(&mut self, payload: &[u8], ctx: &mut Context<'_>) -> Result<Transition> {
        let scram = self
            .scram
            .as_mut()
            .ok_or_else(|| Error::Protocol("SCRAM client not initialized".into()))?;

        match AuthenticationMessage::parse(payload)? {
            AuthenticationMessage::SaslContinue { data } => {
                let server_first = simdutf8::compat::from_utf8(data)
                    .map_err(|e| Error::Auth(format!("invalid server-first-message: {}", e)))?;
                let client_final = scram.process_server_first(server_first)?;
                write_sasl_response(ctx.out, client_final.as_bytes());
                Ok(Transition::Stay)
            }
            AuthenticationMessage::SaslFinal { data } => {
                let server_final = simdutf8::compat::from_utf8(data)
                    .map_err(|e| Error::Auth(format!("invalid server-final-message: {}", e)))?;
                scram.verify_server_final(server_final)?;
                self.phase = Phase::WaitingAuthResult;
                Ok(Transition::Stay)
            }
            auth => Err(Error::Protocol(format!(
                "unexpected SASL message: {:?}",
                auth
            ))),
        }
    }
}

fn password(password: Option<&str>) -> Result<&str> {
    password.ok_or_else(|| Error::Auth("password required but not provided".into()))
}
