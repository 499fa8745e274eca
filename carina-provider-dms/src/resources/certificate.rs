//! dms_certificate

use aws_sdk_databasemigration::primitives::Blob;
use aws_sdk_databasemigration::types::Certificate;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::{Resource, ResourceId, State};
use log::{info, warn};

use super::{api_error, find_failed, timestamp};
use crate::DmsProvider;
use crate::attributes::{AttributeMap, get_str, get_string};
use crate::error::is_not_found;
use crate::find::find_certificate_by_id;
use crate::schemas::certificate::schema;
use crate::tags::{list_tags, set_tags, tags_in, update_tags_from};

fn flatten_certificate(cert: &Certificate) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.set("certificate_arn", cert.certificate_arn())
        .set("certificate_id", cert.certificate_identifier())
        .set("certificate_pem", cert.certificate_pem())
        .set(
            "certificate_wallet",
            cert.certificate_wallet().map(|w| STANDARD.encode(w.as_ref())),
        )
        .set("certificate_creation_date", timestamp(cert.certificate_creation_date()))
        .set("certificate_owner", cert.certificate_owner())
        .set("key_length", cert.key_length())
        .set("signing_algorithm", cert.signing_algorithm())
        .set("valid_from_date", timestamp(cert.valid_from_date()))
        .set("valid_to_date", timestamp(cert.valid_to_date()));
    map
}

impl DmsProvider {
    pub(crate) async fn read_certificate(
        &self,
        id: &ResourceId,
        certificate_id: &str,
    ) -> ProviderResult<State> {
        let cert = match find_certificate_by_id(&self.client, certificate_id).await {
            Ok(cert) => cert,
            Err(e) if e.is_not_found() => {
                warn!("DMS Certificate ({}) not found", certificate_id);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(find_failed("read DMS Certificate", e, id)),
        };

        let mut map = flatten_certificate(&cert);
        if let Some(arn) = cert.certificate_arn() {
            let tags = list_tags(&self.client, arn)
                .await
                .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
            set_tags(&mut map, tags, &self.default_tags);
        }

        Ok(State::existing(id.clone(), map.into_inner()).with_identifier(certificate_id))
    }

    pub(crate) async fn create_certificate(&self, resource: Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let attrs = schema().normalize(&resource.attributes);
        let certificate_id = get_string(&attrs, "certificate_id").ok_or_else(|| {
            ProviderError::new("certificate_id is required").for_resource(id.clone())
        })?;

        let wallet = match get_str(&attrs, "certificate_wallet") {
            Some(encoded) => Some(Blob::new(STANDARD.decode(encoded).map_err(|e| {
                ProviderError::new(format!("certificate_wallet is not valid base64: {}", e))
                    .for_resource(id.clone())
            })?)),
            None => None,
        };

        self.client
            .import_certificate()
            .certificate_identifier(&certificate_id)
            .set_certificate_pem(get_string(&attrs, "certificate_pem"))
            .set_certificate_wallet(wallet)
            .set_tags(tags_in(&attrs, &self.default_tags))
            .send()
            .await
            .map_err(|e| api_error("create DMS Certificate", &e, id))?;

        info!("imported DMS Certificate {}", certificate_id);
        self.read_certificate(id, &certificate_id).await
    }

    /// Only tags can change in place
    pub(crate) async fn update_certificate(
        &self,
        id: ResourceId,
        certificate_id: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        if let Some(arn) = get_str(&from.attributes, "certificate_arn") {
            update_tags_from(
                &self.client,
                arn,
                &from.attributes,
                &to.attributes,
                &self.default_tags,
            )
            .await
            .map_err(|e| ProviderError::new(e).for_resource(id.clone()))?;
        }
        self.read_certificate(&id, certificate_id).await
    }

    pub(crate) async fn delete_certificate(
        &self,
        id: ResourceId,
        certificate_id: &str,
    ) -> ProviderResult<()> {
        let arn = match find_certificate_by_id(&self.client, certificate_id).await {
            Ok(cert) => cert.certificate_arn().unwrap_or_default().to_string(),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(find_failed("read DMS Certificate", e, &id)),
        };

        match self
            .client
            .delete_certificate()
            .certificate_arn(&arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(api_error("delete DMS Certificate", &e, &id)),
        }
    }
}
