//! Model descriptors and the model ancestry tree.
//!
//! A model is a named parameter-space point type. Models form a tree:
//! a child model inherits its parent's parameter set and is acceptable
//! wherever the parent is. The tree is explicit: a parent pointer per
//! descriptor plus an ancestor-chain walk.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::util::InternedString;

/// Error in model hierarchy construction or parameter lookup.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model `{0}` is already defined")]
    DuplicateModel(InternedString),

    #[error("model `{model}` names unknown parent `{parent}`")]
    UnknownParent {
        model: InternedString,
        parent: InternedString,
    },

    #[error("unknown model `{0}`")]
    UnknownModel(InternedString),

    #[error("unknown parameter `{0}`")]
    UnknownParameter(InternedString),
}

/// A named model parameter with its default value and sampling range.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: InternedString,
    pub default: f64,
    pub low: f64,
    pub high: f64,
}

/// One model in the hierarchy.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    name: InternedString,
    parent: Option<InternedString>,
    params: Vec<ParamDef>,
}

impl ModelDescriptor {
    /// Create a root model.
    pub fn new(name: impl AsRef<str>) -> Self {
        ModelDescriptor {
            name: InternedString::new(name),
            parent: None,
            params: Vec::new(),
        }
    }

    /// Set the parent model.
    pub fn with_parent(mut self, parent: impl AsRef<str>) -> Self {
        self.parent = Some(InternedString::new(parent));
        self
    }

    /// Add a parameter definition with default value and range.
    pub fn with_param(mut self, name: impl AsRef<str>, default: f64, low: f64, high: f64) -> Self {
        self.params.push(ParamDef {
            name: InternedString::new(name),
            default,
            low,
            high,
        });
        self
    }

    /// Model name.
    pub fn name(&self) -> InternedString {
        self.name
    }

    /// Parent model name, if any.
    pub fn parent(&self) -> Option<InternedString> {
        self.parent
    }

    /// Parameters declared directly on this model.
    pub fn own_params(&self) -> &[ParamDef] {
        &self.params
    }
}

/// The model ancestry tree with parameter inheritance.
#[derive(Debug, Default)]
pub struct ModelHierarchy {
    models: HashMap<InternedString, ModelDescriptor>,
}

impl ModelHierarchy {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        ModelHierarchy::default()
    }

    /// Add a model. Its parent, if named, must already be present, which
    /// keeps the tree acyclic by construction.
    pub fn add(&mut self, model: ModelDescriptor) -> Result<(), ModelError> {
        if self.models.contains_key(&model.name()) {
            return Err(ModelError::DuplicateModel(model.name()));
        }
        if let Some(parent) = model.parent() {
            if !self.models.contains_key(&parent) {
                return Err(ModelError::UnknownParent {
                    model: model.name(),
                    parent,
                });
            }
        }
        self.models.insert(model.name(), model);
        Ok(())
    }

    /// Look up a model descriptor.
    pub fn get(&self, name: InternedString) -> Option<&ModelDescriptor> {
        self.models.get(&name)
    }

    /// Check presence by name.
    pub fn contains(&self, name: InternedString) -> bool {
        self.models.contains_key(&name)
    }

    /// The model itself followed by its ancestors up to the root.
    pub fn ancestry(&self, name: InternedString) -> Vec<InternedString> {
        let mut chain = Vec::new();
        let mut current = Some(name);
        while let Some(m) = current {
            match self.models.get(&m) {
                Some(desc) => {
                    chain.push(m);
                    current = desc.parent();
                }
                None => break,
            }
        }
        chain
    }

    /// True if `model` is `ancestor` or descends from it.
    pub fn descends_from(&self, model: InternedString, ancestor: InternedString) -> bool {
        self.ancestry(model).contains(&ancestor)
    }

    /// All parameters of a model, inherited ones included. Ancestor
    /// parameters come first; a child redefining a name shadows it.
    pub fn parameters(&self, name: InternedString) -> Result<Vec<ParamDef>, ModelError> {
        if !self.contains(name) {
            return Err(ModelError::UnknownModel(name));
        }
        let mut params: Vec<ParamDef> = Vec::new();
        for model in self.ancestry(name).into_iter().rev() {
            for p in self.models[&model].own_params() {
                if let Some(existing) = params.iter_mut().find(|q| q.name == p.name) {
                    *existing = p.clone();
                } else {
                    params.push(p.clone());
                }
            }
        }
        Ok(params)
    }

    /// A point at every parameter's default value.
    pub fn default_point(&self, name: InternedString) -> Result<ParameterPoint, ModelError> {
        let mut point = ParameterPoint::new();
        for p in self.parameters(name)? {
            point.set(p.name, p.default);
        }
        Ok(point)
    }
}

/// One sampled point in a model's parameter space.
#[derive(Debug, Clone, Default)]
pub struct ParameterPoint {
    values: HashMap<InternedString, f64>,
}

impl ParameterPoint {
    /// Create an empty point.
    pub fn new() -> Self {
        ParameterPoint::default()
    }

    /// Build a point from name/value pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut point = ParameterPoint::new();
        for (name, value) in pairs {
            point.set(InternedString::new(name), value);
        }
        point
    }

    /// Set a parameter value.
    pub fn set(&mut self, name: impl AsRef<str>, value: f64) {
        self.values.insert(InternedString::new(name), value);
    }

    /// Look up a parameter value.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Look up a parameter value, failing on unknown names.
    pub fn value(&self, name: &str) -> Result<f64, ModelError> {
        self.get(name)
            .ok_or_else(|| ModelError::UnknownParameter(InternedString::new(name)))
    }

    /// Iterate over all parameter values.
    pub fn iter(&self) -> impl Iterator<Item = (InternedString, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    /// Number of parameters in the point.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the point has no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.values.keys().copied().collect();
        names.sort();
        write!(f, "{{")?;
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", name, self.values[name])?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> ModelHierarchy {
        let mut h = ModelHierarchy::new();
        h.add(
            ModelDescriptor::new("test_parent_I")
                .with_param("p1", 1.0, -10.0, 10.0)
                .with_param("p2", 2.0, -10.0, 10.0),
        )
        .unwrap();
        h.add(
            ModelDescriptor::new("CMSSM_I")
                .with_parent("test_parent_I")
                .with_param("M0", 1000.0, 0.0, 1e5),
        )
        .unwrap();
        h
    }

    #[test]
    fn test_ancestry_chain() {
        let h = hierarchy();
        let chain = h.ancestry(InternedString::new("CMSSM_I"));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].as_str(), "CMSSM_I");
        assert_eq!(chain[1].as_str(), "test_parent_I");
    }

    #[test]
    fn test_descends_from() {
        let h = hierarchy();
        let child = InternedString::new("CMSSM_I");
        let parent = InternedString::new("test_parent_I");

        assert!(h.descends_from(child, parent));
        assert!(h.descends_from(child, child));
        assert!(!h.descends_from(parent, child));
    }

    #[test]
    fn test_parameter_inheritance() {
        let h = hierarchy();
        let params = h.parameters(InternedString::new("CMSSM_I")).unwrap();
        let names: Vec<_> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["p1", "p2", "M0"]);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut h = ModelHierarchy::new();
        let err = h
            .add(ModelDescriptor::new("orphan").with_parent("missing"))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownParent { .. }));
    }

    #[test]
    fn test_duplicate_model_rejected() {
        let mut h = hierarchy();
        let err = h.add(ModelDescriptor::new("CMSSM_I")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateModel(_)));
    }

    #[test]
    fn test_point_lookup() {
        let point = ParameterPoint::from_pairs([("p1", 0.5), ("p2", -1.5)]);
        assert_eq!(point.get("p1"), Some(0.5));
        assert_eq!(point.value("p2").unwrap(), -1.5);
        assert!(matches!(
            point.value("p9"),
            Err(ModelError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_point_display_is_sorted() {
        let point = ParameterPoint::from_pairs([("b", 2.0), ("a", 1.0)]);
        assert_eq!(point.to_string(), "{a = 1, b = 2}");
    }

    #[test]
    fn test_default_point() {
        let h = hierarchy();
        let point = h.default_point(InternedString::new("CMSSM_I")).unwrap();
        assert_eq!(point.get("p1"), Some(1.0));
        assert_eq!(point.get("M0"), Some(1000.0));
    }
}
