use proptest::prelude::*;
use simbridge_host::marshal;
use simbridge_host::testing::{crash_model, distance_model, ScriptedEngine};
use simbridge_host::EngineSession;
use simbridge_sys::{Crash, CrashInput, Distance, DistanceInput, Sample, TelemetryInput};

fn speed() -> impl Strategy<Value = f64> {
    0.0f64..400.0
}

fn crash_input() -> impl Strategy<Value = CrashInput> {
    (speed(), -50.0f64..50.0, -20.0f64..20.0, -1.0f64..1.0).prop_map(
        |(speed, curr, ay, entropy_diff)| CrashInput {
            speed,
            curr,
            ay,
            entropy_diff,
        },
    )
}

proptest! {
    #[test]
    fn finite_inputs_give_finite_distance(speeds in prop::collection::vec(speed(), 1..64)) {
        let session: EngineSession<Distance, _> =
            EngineSession::open(ScriptedEngine::new(distance_model(0.1))).unwrap();
        let mut expected = 0.0;
        for (step, speed) in speeds.iter().enumerate() {
            let mut input = DistanceInput { speed: *speed };
            let output = session.step(step as f64 * 0.1, &mut input).unwrap();
            expected += speed * 0.1;
            prop_assert!(output.distance.is_finite());
            prop_assert!((output.distance - expected).abs() <= 1e-9 * expected.max(1.0));
        }
    }

    #[test]
    fn crash_model_is_deterministic(input in crash_input(), time_s in 0.0f64..1_000.0) {
        let first: EngineSession<Crash, _> =
            EngineSession::open(ScriptedEngine::new(crash_model())).unwrap();
        let second: EngineSession<Crash, _> =
            EngineSession::open(ScriptedEngine::new(crash_model())).unwrap();
        let (mut a, mut b) = (input, input);
        let out_a = first.step(time_s, &mut a).unwrap();
        let out_b = second.step(time_s, &mut b).unwrap();
        prop_assert_eq!(out_a, out_b);
        prop_assert!(out_a.crash_flag == 0.0 || out_a.crash_flag == 1.0);
    }

    #[test]
    fn telemetry_values_survive_marshalling(values in prop::collection::vec(any::<f64>(), 19)) {
        let input: TelemetryInput = marshal::from_values("telemetry", &values).unwrap();
        let back = marshal::to_values(&input);
        prop_assert_eq!(back.len(), TelemetryInput::FIELDS.len());
        for (sent, received) in values.iter().zip(&back) {
            prop_assert_eq!(sent.to_bits(), received.to_bits());
        }
    }
}
