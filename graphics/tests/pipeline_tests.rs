//! Integration tests for the pipeline caching layer.
//!
//! These exercise the crate's externally observable guarantees end to end on
//! the dummy backend: at-most-one-build per descriptor, single-flight under
//! concurrency, shadow-state elision, activation semantics and feature-flag
//! vocabulary filtering.

use std::sync::Arc;

use rstest::rstest;

use nightshade_graphics::backend::ContextRegistry;
use nightshade_graphics::{
    BlendState, DepthStencilState, DeviceContext, DummyBackend, DummyContext, GraphicsError,
    MaterialPipelines, PipelineDescriptor, RasterState, ShaderFeatureSet, ShaderLibrary,
    TextureTarget,
};

fn dummy_cache() -> (MaterialPipelines, Arc<DummyBackend>) {
    let backend = Arc::new(DummyBackend::new());
    (MaterialPipelines::new(backend.clone()), backend)
}

/// Descriptor from the reference scenario: blend off, depth write on,
/// culling on.
fn d1() -> PipelineDescriptor {
    PipelineDescriptor::new()
        .with_depth_stencil(DepthStencilState::default())
        .with_raster(RasterState::default())
}

// ============================================================================
// Cache Laws
// ============================================================================

/// Structurally equal descriptors resolve to the identical cached instance
/// with zero additional builder invocations.
#[rstest]
#[case::no_flags(ShaderFeatureSet::new())]
#[case::alpha_test(ShaderFeatureSet::from(["ALPHA_TEST"]))]
#[case::textured(ShaderFeatureSet::from(["TEXTURE_MAPPING", "DIFFUSE_MAPPING"]))]
fn test_at_most_one_build(#[case] features: ShaderFeatureSet) {
    let (cache, backend) = dummy_cache();
    let library = ShaderLibrary::standard();
    let basic = library.get("basic").unwrap();

    let first = cache.get_or_create(&d1(), &basic, &features).unwrap();
    let builds_after_first = backend.built_pipeline_count();

    // A freshly constructed but structurally equal descriptor: lookup is by
    // value, not caller identity.
    let second = cache.get_or_create(&d1(), &basic, &features).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.pipeline(), second.pipeline());
    assert_eq!(backend.built_pipeline_count(), builds_after_first);
}

/// Concurrent requests for the same (descriptor, flag-set) key observe
/// exactly one variant compilation and one pipeline build.
#[test]
fn test_single_flight_across_threads() {
    let backend = Arc::new(DummyBackend::new());
    let cache = Arc::new(MaterialPipelines::new(backend.clone()));
    let library = Arc::new(ShaderLibrary::standard());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let library = library.clone();
            std::thread::spawn(move || {
                let phong = library.get("phong").unwrap();
                cache
                    .get_or_create(&d1(), &phong, &ShaderFeatureSet::from(["SHADOW_MAPPING"]))
                    .unwrap()
            })
        })
        .collect();

    let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(backend.built_pipeline_count(), 1, "single-flight law");
    // Two stages compiled once for the single variant.
    assert_eq!(backend.compiled_stage_count(), 2);
    assert!(
        instances
            .windows(2)
            .all(|pair| Arc::ptr_eq(&pair[0], &pair[1])),
        "all callers observe the same instance"
    );
}

/// Distinct pipeline state must never alias in the cache.
#[test]
fn test_distinct_state_distinct_pipelines() {
    let (cache, backend) = dummy_cache();
    let library = ShaderLibrary::standard();
    let basic = library.get("basic").unwrap();
    let features = ShaderFeatureSet::new();

    let opaque = cache.get_or_create(&d1(), &basic, &features).unwrap();
    let blended = cache
        .get_or_create(&d1().with_blend(BlendState::alpha_blending()), &basic, &features)
        .unwrap();

    assert_ne!(opaque.pipeline(), blended.pipeline());
    assert_eq!(backend.built_pipeline_count(), 2);
    assert_eq!(cache.pipeline_cache().len(), 2);
}

// ============================================================================
// Feature-Flag Semantics
// ============================================================================

/// Flags outside the shader's declared vocabulary are ignored, not rejected:
/// the variant equals the one produced by the recognized subset alone.
#[test]
fn test_out_of_vocabulary_flags_are_ignored() {
    let (cache, backend) = dummy_cache();
    let library = ShaderLibrary::standard();
    let basic = library.get("basic").unwrap();

    let recognized = cache
        .get_or_create(&d1(), &basic, &ShaderFeatureSet::from(["ALPHA_TEST"]))
        .unwrap();
    let with_extras = cache
        .get_or_create(
            &d1(),
            &basic,
            // SHADOW_MAPPING and REFLECTION_MAPPING are not part of the
            // basic shader's vocabulary.
            &ShaderFeatureSet::from(["ALPHA_TEST", "SHADOW_MAPPING", "REFLECTION_MAPPING"]),
        )
        .unwrap();

    assert!(Arc::ptr_eq(&recognized, &with_extras));
    assert_eq!(backend.built_pipeline_count(), 1);
}

/// Recognized flag differences produce distinct instances; whether pipelines
/// are shared follows the derived descriptor.
#[test]
fn test_recognized_flags_produce_distinct_variants() {
    let (cache, backend) = dummy_cache();
    let library = ShaderLibrary::standard();
    let phong = library.get("phong").unwrap();

    let alpha = cache
        .get_or_create(&d1(), &phong, &ShaderFeatureSet::from(["ALPHA_TEST"]))
        .unwrap();
    let alpha_shadow = cache
        .get_or_create(
            &d1(),
            &phong,
            &ShaderFeatureSet::from(["ALPHA_TEST", "SHADOW_MAPPING"]),
        )
        .unwrap();

    assert!(!Arc::ptr_eq(&alpha, &alpha_shadow));
    // SHADOW_MAPPING changes both stages' content, so the derived
    // descriptors differ and so do the pipelines.
    assert_ne!(alpha.pipeline(), alpha_shadow.pipeline());
    assert_eq!(backend.built_pipeline_count(), 2);
}

/// The compiled variant's reflected interface drives the binding layout,
/// with well-known engine textures on their fixed units.
#[test]
fn test_shadow_map_binding_uses_fixed_slot() {
    let (cache, _backend) = dummy_cache();
    let library = ShaderLibrary::standard();
    let phong = library.get("phong").unwrap();

    let instance = cache
        .get_or_create(&d1(), &phong, &ShaderFeatureSet::from(["SHADOW_MAPPING"]))
        .unwrap();

    let shadow = instance.bindings().entry("DirectionalShadowMap0").unwrap();
    assert_eq!(
        shadow.binding,
        nightshade_graphics::EngineTextureSlot::DirectionalShadow(0).unit()
    );
}

// ============================================================================
// Device Context Semantics
// ============================================================================

/// Binding the same resource to the same slot twice issues exactly one
/// backend call.
#[test]
fn test_shadow_state_elision() {
    let context = DummyContext::new();

    context.bind_texture(3, TextureTarget::Texture2D, 99);
    context.bind_texture(3, TextureTarget::Texture2D, 99);
    assert_eq!(context.bind_call_count(), 1);

    // A different target at the same slot is a different binding.
    context.bind_texture(3, TextureTarget::Cubemap, 99);
    assert_eq!(context.bind_call_count(), 2);
}

/// Activating an already-current context is a no-op that still succeeds.
#[test]
fn test_activation_idempotent() {
    std::thread::spawn(|| {
        let context = DummyContext::new();
        context.activate().unwrap();
        context.activate().unwrap();
        assert_eq!(context.activation_count(), 1);
    })
    .join()
    .unwrap();
}

/// A context whose native handle was invalidated externally fails activation
/// and never ends up in the thread's current slot.
#[test]
fn test_context_loss_leaves_current_pointer_unchanged() {
    std::thread::spawn(|| {
        let healthy = DummyContext::new();
        healthy.activate().unwrap();

        let lost = DummyContext::new();
        lost.invalidate();
        let err = lost.activate().unwrap_err();
        assert!(matches!(err, GraphicsError::ActivationFailed(_)));

        // Registry slot was emptied by the switch attempt, never set to the
        // failed context.
        let current = ContextRegistry::global().current_id();
        assert_ne!(current, Some(lost.context_id()));
    })
    .join()
    .unwrap();
}

// ============================================================================
// Teardown
// ============================================================================

/// Caches clear in order (instances, then pipelines) ahead of backend drop.
#[test]
fn test_teardown_order() {
    let (cache, backend) = dummy_cache();
    let library = ShaderLibrary::standard();
    let basic = library.get("basic").unwrap();

    cache
        .get_or_create(&d1(), &basic, &ShaderFeatureSet::new())
        .unwrap();
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.pipeline_cache().is_empty());

    drop(cache);
    drop(backend);
}
