use arithmometer::config::RegisterConfig;
use arithmometer::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

fn settle(engine: &ArithmometerEngine) {
    let mut frames = 0;
    while engine.is_busy() {
        engine.advance(16.0).unwrap();
        frames += 1;
        assert!(frames < 100_000, "machine never settled");
    }
}

fn run(engine: &ArithmometerEngine, program: &str) {
    for instruction in parse_program(program).unwrap() {
        engine.execute(&instruction).unwrap();
        settle(engine);
    }
}

fn dial(engine: &ArithmometerEngine, mut value: u64) {
    let mut program = String::new();
    for index in 0..engine.setting().digit_count() {
        program.push_str(&format!("set {} {}\n", index, value % 10));
        value /= 10;
    }
    run(engine, &program);
}

#[test]
fn multiplies_by_repeated_turns_and_carriage_shifts() {
    let engine = ArithmometerEngine::new(MachineConfig::default()).unwrap();
    dial(&engine, 123);
    run(&engine, "turn\nturn\nturn\nturn\nturn\nshift 1\nturn\nturn\nturn\nturn\n");

    assert_eq!(engine.result().value(), Some(5535));
    assert_eq!(engine.counter().value(), Some(45));
    assert_eq!(engine.handle().revolutions(), 9);
    assert_eq!(engine.offset(), 1);
}

#[test]
fn divides_by_repeated_subtraction() {
    let engine = ArithmometerEngine::new(MachineConfig::default()).unwrap();
    dial(&engine, 84);
    run(&engine, "turn\n");
    run(&engine, "clear counter\n");
    assert_eq!(engine.result().value(), Some(84));
    assert_eq!(engine.counter().value(), Some(0));

    dial(&engine, 12);
    run(&engine, "mode sub\n");
    let mut turns = 0;
    while engine.result().value() >= Some(12) {
        run(&engine, "turn\n");
        turns += 1;
    }
    assert_eq!(turns, 7);
    assert_eq!(engine.result().value(), Some(0));
}

#[test]
fn subtracting_below_zero_wraps_the_register() {
    let engine = ArithmometerEngine::new(MachineConfig::default()).unwrap();
    dial(&engine, 1);
    run(&engine, "mode sub\nturn\n");

    let all_nines = 10u128.pow(engine.result().digit_count() as u32) - 1;
    assert_eq!(engine.result().value(), Some(all_nines));
    assert_eq!(
        engine.counter().value(),
        Some(10u128.pow(engine.counter().digit_count() as u32) - 1)
    );
}

#[test]
fn pulling_the_result_lever_clears_both_coupled_registers() {
    let engine = ArithmometerEngine::new(MachineConfig::default()).unwrap();
    dial(&engine, 42);
    run(&engine, "turn\nturn\n");
    assert_eq!(engine.result().value(), Some(84));
    assert_eq!(engine.counter().value(), Some(2));

    let cleared = Rc::new(RefCell::new(Vec::new()));
    for lever in [engine.result_lever(), engine.counter_lever()] {
        let cleared = cleared.clone();
        let label = lever.label().to_string();
        lever.subscribe(LeverEvent::PullDownDone, move |_| {
            cleared.borrow_mut().push(label.clone());
            Ok(())
        });
    }

    run(&engine, "clear result\n");
    assert_eq!(engine.result().value(), Some(0));
    assert_eq!(engine.counter().value(), Some(0));
    assert_eq!(engine.setting().value(), Some(42));
    assert_eq!(*cleared.borrow(), vec!["result", "counter"]);
    assert_eq!(engine.result_lever().state(), LeverState::Rest);
    assert_eq!(engine.counter_lever().state(), LeverState::Rest);
    assert!(!engine.counter_lever().is_following());
}

#[test]
fn a_turn_requested_mid_cycle_is_ignored() {
    let engine = ArithmometerEngine::new(MachineConfig::default()).unwrap();
    dial(&engine, 5);
    engine.execute(&Instruction::Turn).unwrap();
    engine.advance(16.0).unwrap();
    engine.execute(&Instruction::Turn).unwrap();
    settle(&engine);

    assert_eq!(engine.handle().revolutions(), 1);
    assert_eq!(engine.result().value(), Some(5));
}

#[test]
fn adding_then_subtracting_restores_any_register() {
    let config = RegisterConfig {
        digits: 6,
        base: 10,
        ..RegisterConfig::default()
    };
    // A fixed linear congruential sequence keeps the cases reproducible.
    let mut seed = 0x2545_f491u64;
    let mut next = move |bound: u64| {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (seed >> 33) % bound
    };

    for _ in 0..50 {
        let bank = WheelBank::new(&config, ActivityTracker::new()).unwrap();
        let start = next(500_000);
        let operand = next(1_000_000 - start);
        let offset = next(2) as usize;
        let operand = operand / 10u64.pow(offset as u32);

        let mut digits = Vec::new();
        let mut rest = start;
        for index in 0..6 {
            bank.set_digit(index, (rest % 10) as u32).unwrap();
            rest /= 10;
        }
        let mut rest = operand;
        while rest > 0 {
            digits.push((rest % 10) as u32);
            rest /= 10;
        }

        let before = bank.digits();
        bank.set_offset(offset).unwrap();
        bank.add(&digits).unwrap();
        assert_eq!(
            bank.value(),
            Some(u128::from(start + operand * 10u64.pow(offset as u32)))
        );
        bank.subtract(&digits).unwrap();
        assert_eq!(bank.digits(), before, "start {start} operand {operand}");
    }
}

#[tokio::test(start_paused = true)]
async fn frame_clock_drives_a_program_to_completion() {
    let config = MachineConfig {
        resolution: FrameResolution::Medium,
        ..MachineConfig::default()
    };
    let engine = ArithmometerEngine::new(config).unwrap();
    let mut clock = FrameClock::new(&engine.config().resolution);

    for instruction in parse_program("set 0 9\nset 1 9\nturn\nturn").unwrap() {
        engine.execute(&instruction).unwrap();
        while engine.is_busy() {
            let delta = clock.next_frame().await;
            engine.advance(delta).unwrap();
        }
    }

    assert_eq!(engine.result().value(), Some(198));
    assert_eq!(engine.counter().value(), Some(2));
    assert!(clock.frames() > 30);
}
