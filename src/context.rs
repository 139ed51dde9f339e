//! Owner of the objects shared by the assemblies of a model.
use crate::assembly::cache::{new_shared_cache, SharedOperatorCache};
use crate::assembly::{Assembly, AssemblyOptions};
use crate::error::ConfigurationError;
use crate::mesh::Mesh;
use crate::space::ModelingSpace;
use crate::weakform::WeakForm;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Modeling space, named meshes and the element operator cache of a model.
///
/// Meshes and the space are shared with assemblies. Mutating them through the context
/// copies them first if an assembly still holds a reference, so existing assemblies keep
/// seeing the state they were built with.
#[derive(Debug, Clone)]
pub struct Context {
    space: Arc<ModelingSpace>,
    meshes: BTreeMap<String, Arc<Mesh>>,
    cache: SharedOperatorCache,
}

impl Context {
    pub fn new(space: ModelingSpace) -> Self {
        Self {
            space: Arc::new(space),
            meshes: BTreeMap::new(),
            cache: new_shared_cache(),
        }
    }

    pub fn space(&self) -> &Arc<ModelingSpace> {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut ModelingSpace {
        Arc::make_mut(&mut self.space)
    }

    pub fn cache(&self) -> &SharedOperatorCache {
        &self.cache
    }

    pub fn add_mesh(&mut self, name: &str, mesh: Mesh) -> Arc<Mesh> {
        let mesh = Arc::new(mesh);
        self.meshes.insert(name.to_string(), Arc::clone(&mesh));
        mesh
    }

    pub fn mesh(&self, name: &str) -> eyre::Result<Arc<Mesh>> {
        self.meshes
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::InvalidSetting(format!("unknown mesh '{name}'")).into())
    }

    pub fn mesh_mut(&mut self, name: &str) -> eyre::Result<&mut Mesh> {
        let mesh = self
            .meshes
            .get_mut(name)
            .ok_or_else(|| ConfigurationError::InvalidSetting(format!("unknown mesh '{name}'")))?;
        Ok(Arc::make_mut(mesh))
    }

    pub fn mesh_names(&self) -> impl Iterator<Item = &str> {
        self.meshes.keys().map(String::as_str)
    }

    /// Creates an assembly of a weak form over a named mesh.
    pub fn assembly(&self, name: &str, weak_form: impl WeakForm + 'static, mesh: &str) -> eyre::Result<Assembly> {
        Ok(Assembly::new(
            name,
            weak_form,
            self.mesh(mesh)?,
            Arc::clone(&self.space),
            self.cache.clone(),
        ))
    }

    pub fn assembly_with_options(
        &self,
        name: &str,
        weak_form: impl WeakForm + 'static,
        mesh: &str,
        options: AssemblyOptions,
    ) -> eyre::Result<Assembly> {
        Ok(Assembly::with_options(
            name,
            weak_form,
            self.mesh(mesh)?,
            Arc::clone(&self.space),
            self.cache.clone(),
            options,
        ))
    }
}
