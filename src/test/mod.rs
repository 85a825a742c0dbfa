use crate::{
    classfile::{ClassDefinition, ClassDefinitionBuilder},
    ClassLoader,
};

/// Creates a loader with the default configuration and registers `definitions`
pub fn loader_with(definitions: Vec<ClassDefinition>) -> ClassLoader {
    let loader = ClassLoader::new().unwrap();
    loader.define_all(definitions).unwrap();
    loader
}

/// Builder for a public class extending the root class
pub fn class(name: &str) -> ClassDefinitionBuilder {
    ClassDefinition::builder(name)
}

/// Builder for a public interface
pub fn interface(name: &str) -> ClassDefinitionBuilder {
    ClassDefinition::builder(name).interface()
}
