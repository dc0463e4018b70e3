//! AWS SSM Parameter Store backend.

use async_trait::async_trait;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::config::Region;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ssm::types::ParameterType as SsmParameterType;

#[cfg(feature = "tracing")]
use tracing::debug;

use crate::store::{
  ParameterPage, ParameterRecord, ParameterStore, ParameterType, StoreError, StoredParameter,
};

/// Where to find credentials and which region to talk to.
///
/// Unset fields fall back to the standard AWS environment and config files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsmConfig {
  pub profile: Option<String>,
  pub region: Option<String>,
}

/// [`ParameterStore`] backed by SSM Parameter Store.
#[derive(Debug, Clone)]
pub struct SsmStore {
  client: Client,
}

impl SsmStore {
  /// Loads the AWS configuration and builds a client.
  pub async fn connect(config: &SsmConfig) -> Self {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(profile) = &config.profile {
      loader = loader.profile_name(profile);
    }
    if let Some(region) = &config.region {
      loader = loader.region(Region::new(region.clone()));
    }

    #[cfg(feature = "tracing")]
    debug!(?config, "Loading AWS configuration");

    Self::from_client(Client::new(&loader.load().await))
  }

  pub fn from_client(client: Client) -> Self {
    Self { client }
  }
}

fn ssm_type(kind: ParameterType) -> SsmParameterType {
  match kind {
    ParameterType::Plain => SsmParameterType::String,
    ParameterType::Secret => SsmParameterType::SecureString,
  }
}

/// Keeps the service error code so fatal failures can be recognised.
fn store_error<E, R>(error: SdkError<E, R>) -> StoreError
where
  E: ProvideErrorMetadata + std::error::Error + 'static,
  R: std::fmt::Debug,
{
  let code = error.code().map(str::to_string);
  let message = match error.message() {
    Some(message) => message.to_string(),
    None => DisplayErrorContext(&error).to_string(),
  };
  StoreError { code, message }
}

#[async_trait]
impl ParameterStore for SsmStore {
  async fn list(
    &self,
    prefix: &str,
    next_token: Option<String>,
  ) -> Result<ParameterPage, StoreError> {
    let output = self
      .client
      .get_parameters_by_path()
      .path(prefix)
      .recursive(true)
      .with_decryption(true)
      .set_next_token(next_token)
      .send()
      .await
      .map_err(store_error)?;

    let parameters = output
      .parameters()
      .iter()
      .filter_map(|parameter| {
        Some(StoredParameter {
          name: parameter.name()?.to_string(),
          value: parameter.value().unwrap_or_default().to_string(),
        })
      })
      .collect();

    Ok(ParameterPage {
      parameters,
      next_token: output.next_token().map(str::to_string),
    })
  }

  async fn put(&self, record: &ParameterRecord) -> Result<(), StoreError> {
    self
      .client
      .put_parameter()
      .name(&record.path)
      .value(&record.value)
      .r#type(ssm_type(record.kind))
      .overwrite(record.overwrite)
      .description(&record.description)
      .send()
      .await
      .map_err(store_error)?;
    Ok(())
  }

  async fn delete(&self, name: &str) -> Result<(), StoreError> {
    self
      .client
      .delete_parameter()
      .name(name)
      .send()
      .await
      .map_err(store_error)?;
    Ok(())
  }
}
