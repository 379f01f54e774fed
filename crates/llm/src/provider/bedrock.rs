//! AWS Bedrock runtime provider.
//!
//! Uses the raw `InvokeModel` / `InvokeModelWithResponseStream` RPCs with
//! family-shaped JSON bodies rather than the Converse abstraction: the
//! request and event shapes differ per model family, and the family
//! strategies own them.

pub(crate) mod claude;
pub(crate) mod titan;

use async_trait::async_trait;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_bedrockruntime::{
    Client as BedrockRuntimeClient, error::ProvideErrorMetadata, primitives::Blob, types::ResponseStream,
};
use aws_smithy_runtime_api::client::result::SdkError;
use futures::{StreamExt as _, stream};
use secrecy::ExposeSecret;

use crate::{
    error::{LlmError, LlmResult},
    messages::canonical::{CanonicalRequest, CanonicalResponse},
    provider::{ChatStream, Provider},
    routing::ModelFamily,
};

pub(crate) struct BedrockProvider {
    client: BedrockRuntimeClient,
    defaults: config::DefaultMaxTokens,
}

impl BedrockProvider {
    pub async fn new(config: &config::BedrockConfig, defaults: config::DefaultMaxTokens) -> LlmResult<Self> {
        let sdk_config = load_sdk_config(config).await;
        Ok(Self {
            client: BedrockRuntimeClient::new(&sdk_config),
            defaults,
        })
    }

    /// Shapes the canonical request into the family's wire body.
    fn shape(&self, request: &CanonicalRequest, family: ModelFamily) -> LlmResult<Vec<u8>> {
        match family {
            ModelFamily::Claude => claude::shape_request(request, self.defaults.claude),
            ModelFamily::Titan => titan::shape_request(request, self.defaults.titan),
            ModelFamily::OpenAiChat => Err(LlmError::Internal(Some(
                "OpenAI-family models are not served by Bedrock".to_string(),
            ))),
        }
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    async fn invoke(&self, request: CanonicalRequest, family: ModelFamily) -> LlmResult<CanonicalResponse> {
        log::debug!("Bedrock InvokeModel for model: {}", request.model);

        let model_id = request.model.clone();
        let body = self.shape(&request, family)?;

        let output = self
            .client
            .invoke_model()
            .model_id(&model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                log::debug!("InvokeModel failed: {e:?}");
                map_sdk_error(e)
            })?;

        let payload = output.body.into_inner();

        match family {
            ModelFamily::Claude => claude::parse_response(&payload, &model_id),
            ModelFamily::Titan => titan::parse_response(&payload, &model_id),
            ModelFamily::OpenAiChat => Err(LlmError::Internal(None)),
        }
    }

    async fn stream(&self, request: CanonicalRequest, family: ModelFamily) -> LlmResult<ChatStream> {
        log::debug!("Bedrock InvokeModelWithResponseStream for model: {}", request.model);

        let model_id = request.model.clone();
        let body = self.shape(&request, family)?;

        let output = self
            .client
            .invoke_model_with_response_stream()
            .model_id(&model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                log::debug!("InvokeModelWithResponseStream failed: {e:?}");
                map_sdk_error(e)
            })?;

        let state = match family {
            ModelFamily::Claude => FamilyStream::Claude(claude::StreamState::new(model_id)),
            ModelFamily::Titan => FamilyStream::Titan(titan::StreamState::new(model_id)),
            ModelFamily::OpenAiChat => return Err(LlmError::Internal(None)),
        };

        // Pull payload parts off the SDK event receiver and feed them
        // through the family state machine; each part may yield zero or
        // more canonical chunks.
        let chunks = stream::unfold((output.body, state), |(mut receiver, mut state)| async move {
            loop {
                match receiver.recv().await {
                    Ok(Some(ResponseStream::Chunk(part))) => {
                        let Some(bytes) = part.bytes else { continue };

                        match state.on_payload(bytes.as_ref()) {
                            Ok(chunks) if chunks.is_empty() => continue,
                            Ok(chunks) => {
                                let items: Vec<LlmResult<_>> = chunks.into_iter().map(Ok).collect();
                                return Some((stream::iter(items), (receiver, state)));
                            }
                            Err(e) => return Some((stream::iter(vec![Err(e)]), (receiver, state))),
                        }
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => return None,
                    Err(e) => {
                        log::debug!("Bedrock stream error: {e:?}");
                        let item = Err(LlmError::Connection(format!("Bedrock stream error: {e}")));
                        return Some((stream::iter(vec![item]), (receiver, state)));
                    }
                }
            }
        })
        .flatten();

        Ok(Box::pin(chunks))
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}

/// Family-specific stream state behind one dispatch point.
enum FamilyStream {
    Claude(claude::StreamState),
    Titan(titan::StreamState),
}

impl FamilyStream {
    fn on_payload(&mut self, bytes: &[u8]) -> LlmResult<Vec<crate::messages::canonical::CanonicalChunk>> {
        match self {
            FamilyStream::Claude(state) => state.on_payload(bytes),
            FamilyStream::Titan(state) => state.on_payload(bytes),
        }
    }
}

/// Builds the SDK configuration for the configured credential group.
async fn load_sdk_config(config: &config::BedrockConfig) -> aws_config::SdkConfig {
    let region = Region::new(config.region.clone());
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region.clone());

    match &config.credentials {
        config::BedrockCredentials::Static {
            access_key_id,
            secret_access_key,
            session_token,
        } => {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.expose_secret(),
                secret_access_key.expose_secret(),
                session_token.as_ref().map(|token| token.expose_secret().to_string()),
                None,
                "switchyard_static",
            ));
        }
        config::BedrockCredentials::Profile { name } => {
            loader = loader.profile_name(name);
        }
        config::BedrockCredentials::AssumedRole {
            role_arn,
            external_id,
            session_name,
            duration,
        } => {
            let mut builder = aws_config::sts::AssumeRoleProvider::builder(role_arn)
                .region(region)
                .session_name(session_name.clone().unwrap_or_else(|| "switchyard".to_string()));

            if let Some(external_id) = external_id {
                builder = builder.external_id(external_id);
            }

            if let Some(duration) = duration {
                builder = builder.session_length(*duration);
            }

            loader = loader.credentials_provider(builder.build().await);
        }
        config::BedrockCredentials::WebIdentity { token_file, role_arn } => {
            // Web-identity exchange is delegated to the SDK's ambient chain
            // (AWS_WEB_IDENTITY_TOKEN_FILE / AWS_ROLE_ARN); the config
            // values only document intent, so disagreement is worth a
            // warning at startup.
            let env_token = std::env::var("AWS_WEB_IDENTITY_TOKEN_FILE").ok();
            let env_role = std::env::var("AWS_ROLE_ARN").ok();

            if env_token.as_deref() != token_file.to_str() || env_role.as_deref() != Some(role_arn.as_str()) {
                log::warn!(
                    "[llm.bedrock.credentials] web_identity expects AWS_WEB_IDENTITY_TOKEN_FILE and AWS_ROLE_ARN to match the configured values"
                );
            }
        }
        config::BedrockCredentials::Ambient => {}
    }

    let mut sdk_config = loader.load().await;

    if let Some(base_url) = &config.base_url {
        log::debug!("Using custom Bedrock endpoint: {base_url}");
        sdk_config = sdk_config.into_builder().endpoint_url(base_url).build();
    }

    sdk_config
}

/// Maps Bedrock SDK failures into the gateway taxonomy.
fn map_sdk_error<E, R>(error: SdkError<E, R>) -> LlmError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    match &error {
        SdkError::ServiceError(service_error) => {
            let err = service_error.err();
            let message = err.message().unwrap_or("Unknown error").to_string();

            match err.code() {
                Some("UnrecognizedClientException") | Some("InvalidSignatureException") => {
                    LlmError::Authentication(message)
                }
                Some("AccessDeniedException") => LlmError::Authorization(message),
                Some("ResourceNotFoundException") => LlmError::UnsupportedModel(message),
                Some("ThrottlingException") => LlmError::RateLimited(message),
                Some("ValidationException") => LlmError::Validation(message),
                Some("ModelTimeoutException") => LlmError::Upstream { status: 504, message },
                Some("ServiceUnavailableException") | Some("ModelNotReadyException") => {
                    LlmError::ServiceUnavailable(message)
                }
                Some("InternalServerException") => LlmError::Internal(Some(message)),
                _ => LlmError::Upstream { status: 502, message },
            }
        }
        _ => LlmError::Connection(format!("{error:?}")),
    }
}
