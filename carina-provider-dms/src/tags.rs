//! Resource tagging
//!
//! Every taggable resource carries `tags` (configured) and `tags_all`
//! (configured merged with the provider's `default_tags`). The service only
//! knows about `tags_all`.

use std::collections::HashMap;

use aws_sdk_databasemigration::Client;
use aws_sdk_databasemigration::types::Tag;
use carina_core::resource::Value;
use carina_core::schema::ResourceSchema;
use log::debug;

use crate::attributes::{AttributeMap, Attributes, get_string_map};
use crate::error::describe;

pub const TAGS: &str = "tags";
pub const TAGS_ALL: &str = "tags_all";

const SYSTEM_TAG_PREFIX: &str = "aws:";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tags(HashMap<String, String>);

impl Tags {
    pub fn new(tags: HashMap<String, String>) -> Self {
        Self(tags)
    }

    pub fn from_attribute(attrs: &Attributes, key: &str) -> Self {
        Self(get_string_map(attrs, key))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Configured tags layered over the provider defaults
    pub fn merge_defaults(&self, defaults: &Tags) -> Tags {
        let mut merged = defaults.0.clone();
        merged.extend(self.0.clone());
        Tags(merged)
    }

    /// Drop tags the service manages itself
    pub fn ignore_system(self) -> Tags {
        Tags(
            self.0
                .into_iter()
                .filter(|(k, _)| !k.starts_with(SYSTEM_TAG_PREFIX))
                .collect(),
        )
    }

    /// Tags not supplied purely by `defaults` (same key and value)
    pub fn without_defaults(&self, defaults: &Tags) -> Tags {
        Tags(
            self.0
                .iter()
                .filter(|(k, v)| defaults.0.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Keys to remove and tags to add/overwrite to go from `self` to `new`
    pub fn diff(&self, new: &Tags) -> (Vec<String>, Tags) {
        let mut removed: Vec<String> = self
            .0
            .keys()
            .filter(|k| !new.0.contains_key(*k))
            .cloned()
            .collect();
        removed.sort();
        let updated = new
            .0
            .iter()
            .filter(|(k, v)| self.0.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (removed, Tags(updated))
    }

    pub fn to_value(&self) -> Value {
        Value::Map(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl From<&[Tag]> for Tags {
    fn from(tags: &[Tag]) -> Self {
        let mut out = HashMap::new();
        for tag in tags {
            let Some(key) = tag.key() else {
                continue;
            };
            out.insert(key.to_string(), tag.value().unwrap_or_default().to_string());
        }
        Tags(out)
    }
}

impl From<&Tags> for Vec<Tag> {
    fn from(tags: &Tags) -> Self {
        let mut keys: Vec<&String> = tags.0.keys().collect();
        keys.sort();
        keys.into_iter()
            .map(|k| Tag::builder().key(k).value(&tags.0[k]).build())
            .collect()
    }
}

/// Set `tags` and `tags_all` on a flattened attribute map
pub fn set_tags(map: &mut AttributeMap, all: Tags, defaults: &Tags) {
    let all = all.ignore_system();
    map.set(TAGS, all.without_defaults(defaults).to_value());
    map.set(TAGS_ALL, all.to_value());
}

/// Tags to send on create: configured tags merged with the defaults.
/// `None` when there is nothing to send.
pub fn tags_in(attrs: &Attributes, defaults: &Tags) -> Option<Vec<Tag>> {
    let merged = Tags::from_attribute(attrs, TAGS).merge_defaults(defaults);
    (!merged.is_empty()).then(|| Vec::from(&merged))
}

/// Plan `tags_all` for a taggable resource as the configured tags merged
/// over the defaults. Left unplanned while `tags` still holds references.
pub fn plan_tags_all(schema: &ResourceSchema, attrs: &mut Attributes, defaults: &Tags) {
    if !schema.attributes.contains_key(TAGS_ALL)
        || attrs.get(TAGS).is_some_and(Value::is_unresolved)
    {
        return;
    }
    let merged = Tags::from_attribute(attrs, TAGS).merge_defaults(defaults);
    attrs.insert(TAGS_ALL.to_string(), merged.to_value());
}

pub async fn list_tags(client: &Client, arn: &str) -> Result<Tags, String> {
    let output = client
        .list_tags_for_resource()
        .resource_arn(arn)
        .send()
        .await
        .map_err(|e| format!("listing tags for {}: {}", arn, describe(&e)))?;
    Ok(Tags::from(output.tag_list()))
}

/// Bring the remote tags of `arn` from `old` to `new`
pub async fn update_tags(client: &Client, arn: &str, old: &Tags, new: &Tags) -> Result<(), String> {
    let (removed, updated) = old.diff(new);

    if !removed.is_empty() {
        debug!("removing tags {:?} from {}", removed, arn);
        client
            .remove_tags_from_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(removed))
            .send()
            .await
            .map_err(|e| format!("untagging {}: {}", arn, describe(&e)))?;
    }

    if !updated.is_empty() {
        debug!("adding {} tags to {}", updated.len(), arn);
        client
            .add_tags_to_resource()
            .resource_arn(arn)
            .set_tags(Some(Vec::from(&updated)))
            .send()
            .await
            .map_err(|e| format!("tagging {}: {}", arn, describe(&e)))?;
    }

    Ok(())
}

/// Tag update step shared by every resource's update: compares the stored
/// `tags_all` with the configured tags merged over the defaults.
pub async fn update_tags_from(
    client: &Client,
    arn: &str,
    from: &Attributes,
    to: &Attributes,
    defaults: &Tags,
) -> Result<(), String> {
    let old = Tags::from_attribute(from, TAGS_ALL);
    let new = Tags::from_attribute(to, TAGS).merge_defaults(defaults);
    if old == new {
        return Ok(());
    }
    update_tags(client, arn, &old, &new).await
}
