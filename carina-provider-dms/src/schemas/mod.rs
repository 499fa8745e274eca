//! Attribute schemas for the DMS resources and data sources

pub mod certificate;
pub mod endpoint;
pub mod replication_config;
pub mod replication_instance;
pub mod replication_subnet_group;
pub mod replication_task;
pub mod types;

use carina_core::schema::{AttributeSchema, ResourceSchema, types as core_types};

use crate::tags::{TAGS, TAGS_ALL};

/// Add the `tags`/`tags_all` pair every taggable resource carries
pub fn with_tags(schema: ResourceSchema) -> ResourceSchema {
    schema
        .attribute(
            AttributeSchema::new(TAGS, core_types::string_map())
                .with_description("Tags assigned to the resource"),
        )
        .attribute(
            AttributeSchema::new(TAGS_ALL, core_types::string_map())
                .read_only()
                .with_description("Tags including the provider default_tags"),
        )
}

/// Schemas of all managed resource types
pub fn all_schemas() -> Vec<ResourceSchema> {
    vec![
        certificate::schema(),
        endpoint::schema(),
        replication_config::schema(),
        replication_instance::schema(),
        replication_subnet_group::schema(),
        replication_task::schema(),
    ]
}

/// Schema of a data source derived from its resource: the lookup attribute
/// is the only required input; everything else is reported.
pub fn data_source_schema(resource: ResourceSchema, lookup: &str) -> ResourceSchema {
    let mut schema = ResourceSchema::new(resource.resource_type.clone());
    schema.description = resource.description.clone();
    for (name, attr) in resource.attributes {
        let attr = if name == lookup {
            AttributeSchema::new(name, attr.attr_type)
                .required()
                .with_description("Identifier to look up")
        } else if name == TAGS {
            AttributeSchema::new(name, attr.attr_type).computed()
        } else {
            let mut reported = AttributeSchema::new(name, attr.attr_type).read_only();
            reported.sensitive = attr.sensitive;
            reported.description = attr.description;
            reported
        };
        schema = schema.attribute(attr);
    }
    schema
}

/// Data source schemas, each paired with its lookup attribute
pub fn data_source_schemas() -> Vec<(ResourceSchema, &'static str)> {
    vec![
        (certificate::data_source_schema(), certificate::LOOKUP),
        (endpoint::data_source_schema(), endpoint::LOOKUP),
        (replication_instance::data_source_schema(), replication_instance::LOOKUP),
        (
            replication_subnet_group::data_source_schema(),
            replication_subnet_group::LOOKUP,
        ),
        (replication_task::data_source_schema(), replication_task::LOOKUP),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use carina_core::resource::Value;

    use super::*;

    #[test]
    fn resource_types_are_unique() {
        let mut names: Vec<String> = all_schemas().into_iter().map(|s| s.resource_type).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn taggable_resources_report_tags_all() {
        for schema in all_schemas() {
            let tags_all = &schema.attributes[TAGS_ALL];
            assert!(tags_all.read_only, "{}", schema.resource_type);
            assert!(!schema.attributes[TAGS].read_only);
        }
    }

    #[test]
    fn data_source_only_accepts_lookup() {
        let (schema, lookup) = data_source_schemas()
            .into_iter()
            .find(|(s, _)| s.resource_type == endpoint::RESOURCE_TYPE)
            .unwrap();
        let mut attrs = HashMap::new();
        attrs.insert(lookup.to_string(), Value::from("source-endpoint"));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("engine_name".to_string(), Value::from("postgres"));
        assert!(schema.validate(&attrs).is_err());
        assert!(schema.attributes["password"].sensitive);
        assert!(schema.validate(&HashMap::new()).is_err());
    }
}
