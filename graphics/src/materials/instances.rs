//! Material pipeline instances.
//!
//! [`MaterialPipelines`] is the composition point of the whole crate: given a
//! base descriptor, an uber shader and a feature-flag set, it selects and
//! compiles the shader variant, derives the full pipeline descriptor, obtains
//! the backend pipeline through the pipeline cache, computes the
//! resource-binding layout from the compiled shader's reflected interface,
//! and memoizes the resulting [`MaterialPipelineInstance`].
//!
//! Instances are created lazily on first request for a given (descriptor,
//! flag-set) pair and never individually destroyed; the whole cache tears
//! down at once, material instances first, pipeline objects second.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nightshade_core::profiling::profile_scope;

use crate::backend::PipelineBackend;
use crate::error::GraphicsError;
use crate::pipeline::{PipelineCache, PipelineDescriptor, PipelineId, SingleFlight};
use crate::shader::ShaderComposer;
use crate::shader::features::ShaderFeatureSet;
use crate::shader::uber::{CompiledVariant, UberShader};

use super::bindings::BindingLayout;

/// A ready-to-bind pairing of shader variant, pipeline object and binding
/// layout.
///
/// The pipeline object itself stays in the [`PipelineCache`] arena; the
/// instance holds its stable index, not an owning reference.
#[derive(Debug)]
pub struct MaterialPipelineInstance {
    variant: CompiledVariant,
    pipeline: PipelineId,
    bindings: BindingLayout,
}

impl MaterialPipelineInstance {
    /// The compiled shader variant.
    pub fn variant(&self) -> &CompiledVariant {
        &self.variant
    }

    /// Index of the backend pipeline in the pipeline cache.
    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    /// The resource-binding layout for draw submission.
    pub fn bindings(&self) -> &BindingLayout {
        &self.bindings
    }
}

/// Cache of material pipeline instances keyed by (base descriptor, uber
/// shader, recognized feature flags).
pub struct MaterialPipelines {
    backend: Arc<dyn PipelineBackend>,
    composer: ShaderComposer,
    pipelines: PipelineCache,
    instances: SingleFlight<(u64, u64), Arc<MaterialPipelineInstance>>,
}

impl MaterialPipelines {
    /// Create an empty instance cache over `backend`.
    pub fn new(backend: Arc<dyn PipelineBackend>) -> Self {
        Self {
            backend,
            composer: ShaderComposer::new(),
            pipelines: PipelineCache::new(),
            instances: SingleFlight::new(),
        }
    }

    /// Register a composer include available to every uber shader.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.composer.register_include(path, source);
    }

    /// The backend this cache builds against.
    pub fn backend(&self) -> &Arc<dyn PipelineBackend> {
        &self.backend
    }

    /// The underlying pipeline-object cache.
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// Look up or create the instance for (`base`, `uber`, `features`).
    ///
    /// The key sees `features` through the uber shader's vocabulary: flags
    /// the shader does not recognize select the same instance as the
    /// recognized subset alone. Concurrent requests for one key observe a
    /// single variant compilation and a single pipeline build.
    ///
    /// A variant-compilation or pipeline-build failure is scoped to this
    /// request; unrelated cache entries are never evicted by a failure.
    pub fn get_or_create(
        &self,
        base: &PipelineDescriptor,
        uber: &UberShader,
        features: &ShaderFeatureSet,
    ) -> Result<Arc<MaterialPipelineInstance>, GraphicsError> {
        profile_scope!("material_pipeline_instance");

        let key = (
            instance_key(base, uber),
            features.cache_key(&uber.vocabulary()),
        );

        self.instances.get_or_init(key, || {
            log::trace!(
                "material instance miss for uber `{}` ({:016x}/{:016x})",
                uber.name(),
                key.0,
                key.1
            );

            let variant = uber.select(&self.composer, features, &*self.backend)?;
            let full = base.with_stages(variant.stage_keys());
            let bindings = BindingLayout::from_interface(&variant.interface);
            let pipeline = self
                .pipelines
                .get_or_build(&full, || self.backend.build_pipeline(&full, &variant))?;

            Ok(Arc::new(MaterialPipelineInstance {
                variant,
                pipeline,
                bindings,
            }))
        })
    }

    /// Number of cached instances. Growth is unbounded by design; watch this
    /// when material authoring produces more state combinations than
    /// expected.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no instance has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy all instances, then all pipeline objects, in that order.
    ///
    /// Must precede backend device teardown.
    pub fn clear(&self) {
        self.instances.clear();
        self.pipelines.clear();
    }
}

fn instance_key(base: &PipelineDescriptor, uber: &UberShader) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    base.stable_hash().hash(&mut hasher);
    uber.name().hash(&mut hasher);
    hasher.finish()
}

static_assertions::assert_impl_all!(MaterialPipelines: Send, Sync);
