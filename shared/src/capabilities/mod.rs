mod http;
mod kv;

pub use self::http::{
    decode_json, expect_success, AuthScheme, Endpoint, Fault, HttpMethod, HttpOutcome, UrlError,
    ValidatedUrl,
};
pub use self::kv::{KeyNamespace, KvError, KvKey, TypedKvStore};

pub use crux_core::render::Render;
pub use crux_http::Http;
pub use crux_kv::KeyValue;

use crux_core::{
    bridge::ResolveSerialized, capability::ProtoContext, render::RenderOperation, Request,
};
use crux_http::protocol::HttpRequest;
use crux_kv::KeyValueOperation;

use crate::{App, Event};

pub type AppHttp = Http<Event>;
pub type AppKv = KeyValue<Event>;
pub type AppRender = Render<Event>;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("HTTP error: {0}")]
    Http(#[from] Fault),

    #[error("Storage error: {0}")]
    Kv(#[from] KvError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),
}

pub struct Capabilities {
    pub http: AppHttp,
    pub key_value: AppKv,
    pub render: AppRender,
}

/// Side effects the shell is asked to perform.
#[derive(Debug)]
pub enum Effect {
    Http(Request<HttpRequest>),
    KeyValue(Request<KeyValueOperation>),
    Render(Request<RenderOperation>),
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename = "Effect")]
pub enum EffectFfi {
    Http(HttpRequest),
    KeyValue(KeyValueOperation),
    Render(RenderOperation),
}

impl crux_core::Effect for Effect {
    type Ffi = EffectFfi;

    fn serialize(self) -> (Self::Ffi, ResolveSerialized) {
        match self {
            Effect::Http(request) => request.serialize(EffectFfi::Http),
            Effect::KeyValue(request) => request.serialize(EffectFfi::KeyValue),
            Effect::Render(request) => request.serialize(EffectFfi::Render),
        }
    }
}

impl crux_core::WithContext<App, Effect> for Capabilities {
    fn new_with_context(context: ProtoContext<Effect, Event>) -> Capabilities {
        Capabilities {
            http: Http::new(context.specialize(Effect::Http)),
            key_value: KeyValue::new(context.specialize(Effect::KeyValue)),
            render: Render::new(context.specialize(Effect::Render)),
        }
    }
}

impl Effect {
    pub fn is_http(&self) -> bool {
        matches!(self, Effect::Http(_))
    }

    pub fn into_http(self) -> Option<Request<HttpRequest>> {
        match self {
            Effect::Http(request) => Some(request),
            _ => None,
        }
    }

    pub fn is_key_value(&self) -> bool {
        matches!(self, Effect::KeyValue(_))
    }

    pub fn into_key_value(self) -> Option<Request<KeyValueOperation>> {
        match self {
            Effect::KeyValue(request) => Some(request),
            _ => None,
        }
    }

    pub fn is_render(&self) -> bool {
        matches!(self, Effect::Render(_))
    }
}
