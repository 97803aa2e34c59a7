use bypass::{
    Adapter, DType, Device, Forward, ForwardSlot, InjectionManager, Linear, LoraAdapter,
    ManagerConfig, Module, ResidencyPolicy, Tensor,
    testing::{CallLog, CallRecord, FailingAdapter, FailureMode, FailingForward, OffsetAdapter},
};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

mod common;
use common::{ACCEL, doubling_module, host_input, input};

#[test]
fn test_weights_checked_out_only_during_call() {
    let (module, _) = doubling_module("proj");
    let log = CallLog::new();
    let x = Arc::new(OffsetAdapter::new("x", 1.0).with_log(log.clone()));
    let mut manager = InjectionManager::new();
    manager.register_adapter(module.clone(), x.clone()).unwrap();
    manager.rebuild().unwrap();

    assert!(x.weights().is_on_host());
    module.forward(&input(&[1.0])).unwrap();
    assert!(x.weights().is_on_host());

    let calls = log.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].device, ACCEL);
    assert_eq!(calls[0].dtype, DType::F16);
    // Stored precision is restored with the move back.
    assert!(x.weights().snapshot().iter().all(|t| t.dtype() == DType::F32));
}

#[test]
fn test_at_most_one_adapter_resident() {
    let (module, _) = doubling_module("proj");
    let log = CallLog::new();
    let mut manager = InjectionManager::new();
    for name in ["a", "b", "c"] {
        let adapter: Arc<dyn Adapter> =
            Arc::new(OffsetAdapter::new(name, 1.0).with_log(log.clone()));
        log.watch(adapter.clone());
        manager.register_adapter(module.clone(), adapter).unwrap();
    }
    manager.rebuild().unwrap();

    let y = module.forward(&input(&[0.0])).unwrap();
    assert_eq!(y.data(), &[3.0]);
    assert_eq!(log.names(), vec!["a", "b", "c"]);
    assert!(log.calls().iter().all(|c| c.resident == 1));
}

#[test]
fn test_host_input_keeps_weights_on_host() {
    let (module, _) = doubling_module("proj");
    let log = CallLog::new();
    let mut manager = InjectionManager::new();
    let x = Arc::new(OffsetAdapter::new("x", 1.0).with_log(log.clone()));
    manager.register_adapter(module.clone(), x).unwrap();
    manager.rebuild().unwrap();

    module.forward(&host_input(&[1.0])).unwrap();
    assert_eq!(
        log.calls(),
        vec![CallRecord {
            adapter: "x".into(),
            device: Device::Host,
            dtype: DType::F32,
            resident: 0,
        }]
    );
}

#[test]
fn test_failing_base_forward_releases_weights() {
    let module = Arc::new(Module::new("proj", FailingForward::new("base exploded").into_forward()));
    let x = Arc::new(OffsetAdapter::new("x", 1.0));
    let mut manager = InjectionManager::new();
    manager.register_adapter(module.clone(), x.clone()).unwrap();
    manager.rebuild().unwrap();

    let err = module.forward(&input(&[1.0])).unwrap_err();
    assert_eq!(err.to_string(), "base exploded");
    assert!(x.weights().is_on_host());
}

#[test]
fn test_failing_correction_releases_weights() {
    let (module, _) = doubling_module("proj");
    let first = Arc::new(OffsetAdapter::new("x", 1.0));
    let failing = Arc::new(FailingAdapter::new("bad", FailureMode::Error));
    let mut manager = InjectionManager::new();
    manager.register_adapter(module.clone(), first.clone()).unwrap();
    manager.register_adapter(module.clone(), failing.clone()).unwrap();
    manager.rebuild().unwrap();

    let err = module.forward(&input(&[1.0])).unwrap_err();
    assert_eq!(err.to_string(), "bad correction failed");
    assert!(first.weights().is_on_host());
    assert!(failing.weights().is_on_host());
}

#[test]
fn test_panicking_correction_releases_weights() {
    let (module, _) = doubling_module("proj");
    let failing = Arc::new(FailingAdapter::new("bad", FailureMode::Panic));
    let mut manager = InjectionManager::new();
    manager.register_adapter(module.clone(), failing.clone()).unwrap();
    manager.rebuild().unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| module.forward(&input(&[1.0]))));
    assert!(result.is_err());
    assert!(failing.weights().is_on_host());
    assert!(failing.weights().snapshot().iter().all(|t| t.device().is_host()));

    // The module stays usable once the adapter is gone.
    manager.remove_adapter("bad");
    manager.rebuild().unwrap();
    assert_eq!(module.forward(&input(&[1.0])).unwrap().data(), &[2.0]);
}

#[test]
fn test_policy_without_offload_leaves_weights_resident() {
    let (module, _) = doubling_module("proj");
    let x = Arc::new(OffsetAdapter::new("x", 1.0));
    let policy = ResidencyPolicy::MATCH_DEVICE | ResidencyPolicy::MATCH_DTYPE;
    let mut manager = InjectionManager::with_config(ManagerConfig::new().with_policy(policy));
    manager.register_adapter(module.clone(), x.clone()).unwrap();
    manager.rebuild().unwrap();

    module.forward(&input(&[1.0])).unwrap();
    assert_eq!(x.weights().device(), ACCEL);
}

#[test]
fn test_lora_over_linear_on_accelerator() {
    // W = I, b = none; down = [[1, 1]], up = [[1], [-1]], alpha = rank = 1
    let weight = Tensor::matrix(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
    let base = Linear::new(weight, None).unwrap().into_forward();
    let module = Arc::new(Module::new("attn.to_q", base));

    let down = Tensor::matrix(1, 2, vec![1.0, 1.0]).unwrap();
    let up = Tensor::matrix(2, 1, vec![1.0, -1.0]).unwrap();
    let lora = Arc::new(LoraAdapter::new("style", down, up, 1.0).unwrap().with_strength(0.5));

    let mut manager = InjectionManager::new();
    manager.register_adapter(module.clone(), lora.clone()).unwrap();
    manager.rebuild().unwrap();

    let x = Tensor::matrix(1, 2, vec![2.0, 4.0]).unwrap().on(ACCEL, DType::BF16);
    // x + 0.5 * (2 + 4) * [1, -1]
    let y = module.forward(&x).unwrap();
    assert_eq!(y.data(), &[5.0, 1.0]);
    assert_eq!(y.device(), ACCEL);
    assert!(lora.weights().is_on_host());

    manager.teardown();
    assert_eq!(module.forward(&x).unwrap().data(), &[2.0, 4.0]);
    assert!(module.current().hook_tag().is_none());
}
