use bytes::Bytes;
use ethereum_types::{Address, U256};
use hostevm::{
    constants::{MAX_CODE_SIZE, SUCCESS_FOR_CALL},
    environment::Environment,
    errors::{TxResult, VMError},
    operations::{ops_to_bytecode, Operation},
    utils::{
        calculate_create2_address, calculate_create_address, new_vm_with_ops,
        new_vm_with_ops_addr_bal, test_contract_address, word_to_address,
        DEFAULT_TEST_GAS_LIMIT,
    },
    vm::TxKind,
    Account, CacheDB, Db, GeneralizedDatabase, VM,
};
use std::sync::Arc;

fn create_opcodes(size: usize, offset: usize, value_to_transfer: usize) -> Vec<Operation> {
    vec![
        Operation::Push((16, U256::from(size))),
        Operation::Push((1, U256::from(offset))),
        Operation::Push((1, U256::from(value_to_transfer))),
        Operation::Create,
        Operation::Stop,
    ]
}

fn callee_return_bytecode(return_value: U256) -> Bytes {
    let ops = vec![
        Operation::Push((32, return_value)), // value
        Operation::Push((32, U256::zero())), // offset
        Operation::Mstore,
        Operation::Push((32, U256::from(32))), // size
        Operation::Push((32, U256::zero())),   // offset
        Operation::Return,
    ];
    ops_to_bytecode(&ops)
}

fn call_opcodes(gas: u64, callee: U256, value: u64, ret_size: usize) -> Vec<Operation> {
    vec![
        Operation::Push((32, U256::from(ret_size))), // ret_size
        Operation::Push((32, U256::zero())),         // ret_offset
        Operation::Push((32, U256::zero())),         // args_size
        Operation::Push((32, U256::zero())),         // args_offset
        Operation::Push((32, U256::from(value))),    // value
        Operation::Push((32, callee)),               // address
        Operation::Push((32, U256::from(gas))),      // gas
        Operation::Call,
        Operation::Stop,
    ]
}

fn balance_sum(state: &CacheDB) -> U256 {
    state
        .values()
        .fold(U256::zero(), |acc, account| acc + account.info.balance)
}

#[test]
fn add_op() {
    let mut vm = new_vm_with_ops(&[
        Operation::Push((32, U256::one())),
        Operation::Push((32, U256::zero())),
        Operation::Add,
        Operation::Stop,
    ])
    .unwrap();

    vm.execute().unwrap();

    assert_eq!(
        vm.current_call_frame_mut().unwrap().stack.pop().unwrap(),
        U256::one()
    );
    // The frame halted on the STOP at the end of the two pushes and the ADD.
    assert_eq!(vm.current_call_frame_mut().unwrap().pc, 67);
}

#[test]
fn div_by_zero_yields_zero() {
    let mut vm = new_vm_with_ops(&[
        Operation::Push((1, U256::zero())),
        Operation::Push((1, U256::from(10))),
        Operation::Div,
        Operation::Stop,
    ])
    .unwrap();

    vm.execute().unwrap();

    assert_eq!(
        vm.current_call_frame_mut().unwrap().stack.pop().unwrap(),
        U256::zero()
    );
}

#[test]
fn mstore_then_mload_round_trips() {
    let mut vm = new_vm_with_ops(&[
        Operation::Push((32, U256::from(0xABCDEF))), // value
        Operation::Push((1, U256::from(64))),        // offset
        Operation::Mstore,
        Operation::Push((1, U256::from(64))), // offset
        Operation::Mload,
        Operation::Msize,
        Operation::Stop,
    ])
    .unwrap();

    vm.execute().unwrap();

    let frame = vm.current_call_frame_mut().unwrap();
    assert_eq!(frame.stack.pop().unwrap(), U256::from(96));
    assert_eq!(frame.stack.pop().unwrap(), U256::from(0xABCDEF));
}

#[test]
fn sstore_then_sload() {
    let mut vm = new_vm_with_ops(&[
        Operation::Push((2, U256::from(0xABCD))), // value
        Operation::Push((1, U256::from(7))),      // key
        Operation::Sstore,
        Operation::Push((1, U256::from(7))), // key
        Operation::Sload,
        Operation::Stop,
    ])
    .unwrap();

    let report = vm.execute().unwrap();

    assert!(report.is_success());
    assert_eq!(
        vm.current_call_frame_mut().unwrap().stack.pop().unwrap(),
        U256::from(0xABCD)
    );
}

#[test]
fn call_changes_callframe_and_stores() {
    let callee_return_value = U256::from(0xAAAAAAA);
    let callee_address = Address::from_low_u64_be(2);
    let callee_account = Account::default()
        .with_balance(50000.into())
        .with_bytecode(callee_return_bytecode(callee_return_value));

    let caller_ops = call_opcodes(100_000, U256::from(2), 0, 32);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(callee_address, callee_account);

    vm.execute().unwrap();

    let current_call_frame = vm.current_call_frame_mut().unwrap();

    let success = current_call_frame.stack.pop().unwrap();
    assert_eq!(success, SUCCESS_FOR_CALL);

    // The child's output lands both in the reserved memory window and
    // in the caller's sub-return-data buffer.
    let return_data = current_call_frame.sub_return_data.clone();
    assert_eq!(U256::from_big_endian(&return_data), callee_return_value);
    let memory_window = current_call_frame.memory.get(0..32).unwrap();
    assert_eq!(U256::from_big_endian(memory_window), callee_return_value);
}

#[test]
fn call_with_value_transfers_balance() {
    let callee_address = Address::from_low_u64_be(2);

    let caller_ops = call_opcodes(100_000, U256::from(2), 100, 0);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(300.into())
            .with_bytecode(ops_to_bytecode(&caller_ops)),
    );
    vm.db
        .add_account(callee_address, Account::default());

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let caller = report.new_state.get(&test_contract_address()).unwrap();
    let callee = report.new_state.get(&callee_address).unwrap();
    assert_eq!(caller.info.balance, U256::from(200));
    assert_eq!(callee.info.balance, U256::from(100));
    assert_eq!(balance_sum(&report.new_state), U256::from(300));

    let success = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(success, SUCCESS_FOR_CALL);
}

#[test]
fn revert_rolls_back_transfer() {
    let callee_address = Address::from_low_u64_be(2);
    // PUSH0 PUSH0 REVERT: revert with empty data, burning only 4 gas.
    let reverting_bytecode = ops_to_bytecode(&[
        Operation::Push0,
        Operation::Push0,
        Operation::Revert,
    ]);

    let caller_ops = call_opcodes(100_000, U256::from(2), 100, 0);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(500.into())
            .with_bytecode(ops_to_bytecode(&caller_ops)),
    );
    vm.db
        .add_account(callee_address, Account::default().with_bytecode(reverting_bytecode));

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    // Neither balance moved.
    let caller = report.new_state.get(&test_contract_address()).unwrap();
    let callee = report.new_state.get(&callee_address).unwrap();
    assert_eq!(caller.info.balance, U256::from(500));
    assert_eq!(callee.info.balance, U256::zero());

    // The caller lost exactly what the child burned: 7 pushes (21) plus
    // the 4 gas consumed before the REVERT.
    assert_eq!(report.gas_used, 25);

    let success = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(success, U256::zero());
}

#[test]
fn returndatasize_reflects_child_output() {
    let callee_address = Address::from_low_u64_be(2);
    let callee_account = Account::default()
        .with_bytecode(callee_return_bytecode(U256::from(0xBEEF)));

    let caller_ops = vec![
        Operation::Push((32, U256::zero())),        // ret_size
        Operation::Push((32, U256::zero())),        // ret_offset
        Operation::Push((32, U256::zero())),        // args_size
        Operation::Push((32, U256::zero())),        // args_offset
        Operation::Push((32, U256::zero())),        // value
        Operation::Push((32, U256::from(2))),       // address
        Operation::Push((32, U256::from(100_000))), // gas
        Operation::Call,
        Operation::ReturnDataSize,
        Operation::Stop,
    ];

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(callee_address, callee_account);

    vm.execute().unwrap();

    let frame = vm.current_call_frame_mut().unwrap();
    assert_eq!(frame.stack.pop().unwrap(), U256::from(32));
    assert_eq!(frame.stack.pop().unwrap(), SUCCESS_FOR_CALL);
}

#[test]
fn staticcall_forbids_sstore() {
    let callee_address = Address::from_low_u64_be(2);
    let storing_bytecode = ops_to_bytecode(&[
        Operation::Push((1, U256::one())),  // value
        Operation::Push((1, U256::zero())), // key
        Operation::Sstore,
        Operation::Stop,
    ]);

    let caller_ops = vec![
        Operation::Push((32, U256::zero())),        // ret_size
        Operation::Push((32, U256::zero())),        // ret_offset
        Operation::Push((32, U256::zero())),        // args_size
        Operation::Push((32, U256::zero())),        // args_offset
        Operation::Push((32, U256::from(2))),       // address
        Operation::Push((32, U256::from(100_000))), // gas
        Operation::StaticCall,
        Operation::Stop,
    ];

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db
        .add_account(callee_address, Account::default().with_bytecode(storing_bytecode));

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    // The write never landed and the caller saw a failed call.
    let callee = report.new_state.get(&callee_address).unwrap();
    assert!(callee.storage.is_empty());
    let success = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(success, U256::zero());
}

#[test]
fn read_only_propagates_through_inner_calls() {
    let storer_address = Address::from_low_u64_be(3);
    let storing_bytecode = ops_to_bytecode(&[
        Operation::Push((1, U256::one())),  // value
        Operation::Push((1, U256::zero())), // key
        Operation::Sstore,
        Operation::Stop,
    ]);

    // Calls the storer with no value, then returns the inner call's
    // success flag as its own output.
    let middle_address = Address::from_low_u64_be(2);
    let middle_ops = vec![
        Operation::Push((32, U256::zero())),       // ret_size
        Operation::Push((32, U256::zero())),       // ret_offset
        Operation::Push((32, U256::zero())),       // args_size
        Operation::Push((32, U256::zero())),       // args_offset
        Operation::Push((32, U256::zero())),       // value
        Operation::Push((32, U256::from(3))),      // address
        Operation::Push((32, U256::from(50_000))), // gas
        Operation::Call,
        Operation::Push0, // offset for MSTORE
        Operation::Mstore,
        Operation::Push((1, U256::from(32))), // size
        Operation::Push0,                     // offset
        Operation::Return,
    ];

    let caller_ops = vec![
        Operation::Push((32, U256::from(32))),      // ret_size
        Operation::Push((32, U256::zero())),        // ret_offset
        Operation::Push((32, U256::zero())),        // args_size
        Operation::Push((32, U256::zero())),        // args_offset
        Operation::Push((32, U256::from(2))),       // address
        Operation::Push((32, U256::from(100_000))), // gas
        Operation::StaticCall,
        Operation::Stop,
    ];

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db
        .add_account(middle_address, Account::default().with_bytecode(ops_to_bytecode(&middle_ops)));
    vm.db
        .add_account(storer_address, Account::default().with_bytecode(storing_bytecode));

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    // The middle frame itself succeeded...
    let frame = vm.current_call_frame_mut().unwrap();
    assert_eq!(frame.stack.pop().unwrap(), SUCCESS_FOR_CALL);
    // ...but its inner mutating call did not, and no slot was written.
    let inner_flag = U256::from_big_endian(frame.memory.get(0..32).unwrap());
    assert_eq!(inner_flag, U256::zero());
    let storer = report.new_state.get(&storer_address).unwrap();
    assert!(storer.storage.is_empty());
}

#[test]
fn call_with_insufficient_balance_reverts_caller() {
    let callee_address = Address::from_low_u64_be(2);

    // The caller contract holds no balance at all.
    let caller_ops = call_opcodes(100_000, U256::from(2), 1, 0);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(callee_address, Account::default());

    let report = vm.execute().unwrap();

    assert_eq!(
        report.result,
        TxResult::Revert(VMError::InsufficientBalance)
    );
    assert_eq!(report.gas_used, DEFAULT_TEST_GAS_LIMIT);
}

#[test]
fn call_at_depth_limit_pushes_zero() {
    let callee_address = Address::from_low_u64_be(2);
    let caller_ops = call_opcodes(100_000, U256::from(2), 0, 0);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(callee_address, Account::default());
    vm.current_call_frame_mut().unwrap().depth = 1024;

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let success = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(success, U256::zero());
}

#[test]
fn create_happy_path() {
    let value_to_transfer = 10;
    let offset = 19;
    let size = 13;
    let sender_addr = Address::from_low_u64_be(40);

    // Init code that deploys the 4-byte runtime 0xFFFFFFFF.
    let initialization_code = hex::decode("63FFFFFFFF6000526004601CF3").unwrap();

    let operations = [
        vec![
            Operation::Push((13, U256::from_big_endian(&initialization_code))),
            Operation::Push0,
            Operation::Mstore,
        ],
        create_opcodes(size, offset, value_to_transfer),
    ]
    .concat();

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(25.into())
            .with_bytecode(ops_to_bytecode(&operations)),
    );

    let expected_address = calculate_create_address(test_contract_address(), 0).unwrap();

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let returned_addr = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(word_to_address(returned_addr), expected_address);

    let new_account = report.new_state.get(&expected_address).unwrap();
    assert_eq!(new_account.info.balance, U256::from(value_to_transfer));
    assert_eq!(new_account.info.nonce, 1);
    assert_eq!(new_account.info.bytecode, Bytes::from(vec![0xFF; 4]));

    let deployer = report.new_state.get(&test_contract_address()).unwrap();
    assert_eq!(deployer.info.nonce, 1);
    assert_eq!(deployer.info.balance, U256::from(25 - value_to_transfer));
}

#[test]
fn create2_happy_path() {
    let value: u8 = 10;
    let offset: u8 = 19;
    let size: u8 = 13;
    let salt: u8 = 4;
    let sender_addr = Address::from_low_u64_be(40);

    let initialization_code = hex::decode("63FFFFFFFF6000526004601CF3").unwrap();
    let expected_address = calculate_create2_address(
        test_contract_address(),
        &Bytes::from(initialization_code.clone()),
        U256::from(salt),
    )
    .unwrap();

    let operations = vec![
        // Store the init code in memory.
        Operation::Push((13, U256::from_big_endian(&initialization_code))),
        Operation::Push0,
        Operation::Mstore,
        // Create.
        Operation::Push((1, U256::from(salt))),
        Operation::Push((1, U256::from(size))),
        Operation::Push((1, U256::from(offset))),
        Operation::Push((1, U256::from(value))),
        Operation::Create2,
        Operation::Stop,
    ];

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(25.into())
            .with_bytecode(ops_to_bytecode(&operations)),
    );

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let returned_addr = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(word_to_address(returned_addr), expected_address);

    let new_account = report.new_state.get(&expected_address).unwrap();
    assert_eq!(new_account.info.balance, U256::from(value));
    assert_eq!(new_account.info.nonce, 1);
}

#[test]
fn create_collision_pushes_zero_and_bumps_nonce() {
    let sender_addr = Address::from_low_u64_be(40);
    let operations = create_opcodes(13, 19, 10);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(25.into())
            .with_bytecode(ops_to_bytecode(&operations)),
    );

    // The derived address is already occupied by a nonce-1 account.
    let colliding_address = calculate_create_address(test_contract_address(), 0).unwrap();
    vm.db
        .add_account(colliding_address, Account::default().with_nonce(1));

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let created = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(created, U256::zero());

    // Nonce bumped, no transfer, occupant untouched.
    let deployer = report.new_state.get(&test_contract_address()).unwrap();
    assert_eq!(deployer.info.nonce, 1);
    assert_eq!(deployer.info.balance, U256::from(25));
    let occupant = report.new_state.get(&colliding_address).unwrap();
    assert_eq!(occupant.info.nonce, 1);
    assert_eq!(occupant.info.balance, U256::zero());
}

#[test]
fn cant_create_if_transfer_value_bigger_than_balance() {
    let sender_addr = Address::from_low_u64_be(40);
    let operations = create_opcodes(13, 19, 100);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(25.into())
            .with_bytecode(ops_to_bytecode(&operations)),
    );

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let created = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(created, U256::zero());

    let deployer = report.new_state.get(&test_contract_address()).unwrap();
    assert_eq!(deployer.info.nonce, 0);
    assert_eq!(deployer.info.balance, U256::from(25));
}

#[test]
fn cant_create_if_sender_nonce_would_overflow() {
    let sender_addr = Address::from_low_u64_be(40);
    let operations = create_opcodes(13, 19, 10);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(25.into())
            .with_nonce(u64::MAX)
            .with_bytecode(ops_to_bytecode(&operations)),
    );

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let created = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(created, U256::zero());

    let deployer = report.new_state.get(&test_contract_address()).unwrap();
    assert_eq!(deployer.info.nonce, u64::MAX);
    assert_eq!(deployer.info.balance, U256::from(25));
}

#[test]
fn create_at_depth_limit_pushes_zero() {
    let sender_addr = Address::from_low_u64_be(40);
    let operations = create_opcodes(13, 19, 0);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();
    vm.current_call_frame_mut().unwrap().depth = 1024;

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let created = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(created, U256::zero());

    let deployer = report.new_state.get(&test_contract_address()).unwrap();
    assert_eq!(deployer.info.nonce, 0);
}

#[test]
fn cant_create_on_static_contexts() {
    let sender_addr = Address::from_low_u64_be(40);
    let operations = create_opcodes(13, 19, 0);

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();
    vm.current_call_frame_mut().unwrap().is_static = true;

    let report = vm.execute().unwrap();

    assert_eq!(
        report.result,
        TxResult::Revert(VMError::OpcodeNotAllowedInStaticContext)
    );
    assert_eq!(report.gas_used, DEFAULT_TEST_GAS_LIMIT);
    let deployer = report.new_state.get(&test_contract_address()).unwrap();
    assert_eq!(deployer.info.nonce, 0);
}

#[test]
fn create_with_reverting_init_code_still_bumps_nonce() {
    let sender_addr = Address::from_low_u64_be(40);

    // Init code is a single INVALID byte stored at offset 31.
    let operations = [
        vec![
            Operation::Push((1, U256::from(0xFE))),
            Operation::Push0,
            Operation::Mstore,
        ],
        create_opcodes(1, 31, 0),
    ]
    .concat();

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let created = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(created, U256::zero());

    // The deployer's nonce moved exactly once despite the failure, and
    // no account exists at the derived address.
    let deployer = report.new_state.get(&test_contract_address()).unwrap();
    assert_eq!(deployer.info.nonce, 1);
    let failed_address = calculate_create_address(test_contract_address(), 0).unwrap();
    assert!(report.new_state.get(&failed_address).is_none());
}

#[test]
fn create_fails_when_deployed_code_is_too_big() {
    let sender_addr = Address::from_low_u64_be(40);

    // Init code: PUSH3 (MAX_CODE_SIZE + 1) PUSH0 RETURN.
    let oversize = U256::from(MAX_CODE_SIZE + 1);
    let init_ops = vec![
        Operation::Push((3, oversize)),
        Operation::Push0,
        Operation::Return,
    ];
    let init_code = ops_to_bytecode(&init_ops);
    assert_eq!(init_code.len(), 6);

    let operations = [
        vec![
            Operation::Push((6, U256::from_big_endian(&init_code))),
            Operation::Push0,
            Operation::Mstore,
        ],
        create_opcodes(6, 26, 0),
    ]
    .concat();

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        sender_addr,
        U256::from(25),
    )
    .unwrap();

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let created = vm.current_call_frame_mut().unwrap().stack.pop().unwrap();
    assert_eq!(created, U256::zero());
    let failed_address = calculate_create_address(test_contract_address(), 0).unwrap();
    assert!(report.new_state.get(&failed_address).is_none());
}

#[test]
fn selfdestruct_transfers_everything_and_marks_account() {
    let recipient = Address::from_low_u64_be(0xBEEF);
    let operations = vec![
        Operation::Push((32, U256::from_big_endian(recipient.as_bytes()))),
        Operation::SelfDestruct,
    ];

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(100.into())
            .with_bytecode(ops_to_bytecode(&operations)),
    );

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let destroyed = report.new_state.get(&test_contract_address()).unwrap();
    assert!(destroyed.destructed);
    assert_eq!(destroyed.info.balance, U256::zero());
    let beneficiary = report.new_state.get(&recipient).unwrap();
    assert_eq!(beneficiary.info.balance, U256::from(100));
}

#[test]
fn selfdestruct_to_self_sends_funds_to_zero_address() {
    let operations = vec![
        Operation::Push((
            32,
            U256::from_big_endian(test_contract_address().as_bytes()),
        )),
        Operation::SelfDestruct,
    ];

    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&operations),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(
        test_contract_address(),
        Account::default()
            .with_balance(100.into())
            .with_bytecode(ops_to_bytecode(&operations)),
    );

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let destroyed = report.new_state.get(&test_contract_address()).unwrap();
    assert!(destroyed.destructed);
    assert_eq!(destroyed.info.balance, U256::zero());
    let zero = report.new_state.get(&Address::zero()).unwrap();
    assert_eq!(zero.info.balance, U256::from(100));
}

#[test]
fn selfdestruct_reverts_in_static_context() {
    let operations = vec![
        Operation::Push((32, U256::from(0xBEEF))),
        Operation::SelfDestruct,
    ];

    let mut vm = new_vm_with_ops(&operations).unwrap();
    vm.current_call_frame_mut().unwrap().is_static = true;

    let report = vm.execute().unwrap();
    assert_eq!(
        report.result,
        TxResult::Revert(VMError::OpcodeNotAllowedInStaticContext)
    );
}

#[test]
fn invalid_consumes_all_gas() {
    let mut vm = new_vm_with_ops(&[Operation::Invalid]).unwrap();

    let report = vm.execute().unwrap();

    assert_eq!(report.result, TxResult::Revert(VMError::InvalidOpcode));
    assert_eq!(report.gas_used, DEFAULT_TEST_GAS_LIMIT);
    assert!(report.output.is_empty());
}

#[test]
fn revert_surfaces_its_output() {
    let mut vm = new_vm_with_ops(&[
        Operation::Push((32, U256::from(0xDEAD))), // value
        Operation::Push0,                          // offset
        Operation::Mstore,
        Operation::Push((1, U256::from(32))), // size
        Operation::Push0,                     // offset
        Operation::Revert,
    ])
    .unwrap();

    let report = vm.execute().unwrap();

    assert_eq!(report.result, TxResult::Revert(VMError::RevertOpcode));
    assert_eq!(U256::from_big_endian(&report.output), U256::from(0xDEAD));
    // A REVERT keeps its unconsumed gas.
    assert!(report.gas_used < DEFAULT_TEST_GAS_LIMIT);
}

#[test]
fn identity_precompile_roundtrip() {
    let input_word = U256::from(0x1234_5678u64);
    let operations = vec![
        // Write the input at memory[0..32].
        Operation::Push((32, input_word)),
        Operation::Push0,
        Operation::Mstore,
        // CALL the identity precompile, output to memory[32..64].
        Operation::Push((32, U256::from(32))),     // ret_size
        Operation::Push((32, U256::from(32))),     // ret_offset
        Operation::Push((32, U256::from(32))),     // args_size
        Operation::Push((32, U256::zero())),       // args_offset
        Operation::Push((32, U256::zero())),       // value
        Operation::Push((32, U256::from(4))),      // address
        Operation::Push((32, U256::from(10_000))), // gas
        Operation::Call,
        Operation::Stop,
    ];

    let mut vm = new_vm_with_ops(&operations).unwrap();

    let report = vm.execute().unwrap();
    assert!(report.is_success());

    let frame = vm.current_call_frame_mut().unwrap();
    assert_eq!(frame.stack.pop().unwrap(), SUCCESS_FOR_CALL);
    let echoed = U256::from_big_endian(frame.memory.get(32..64).unwrap());
    assert_eq!(echoed, input_word);
    assert_eq!(
        U256::from_big_endian(&frame.sub_return_data),
        input_word
    );
}

#[test]
fn logs_merge_into_caller_on_success_and_drop_on_revert() {
    let emitter_address = Address::from_low_u64_be(2);
    let emitting_bytecode = ops_to_bytecode(&[
        Operation::Push0, // size
        Operation::Push0, // offset
        Operation::Log(0),
        Operation::Stop,
    ]);
    let emitting_then_reverting = ops_to_bytecode(&[
        Operation::Push0, // size
        Operation::Push0, // offset
        Operation::Log(0),
        Operation::Push0,
        Operation::Push0,
        Operation::Revert,
    ]);

    // Success: the log survives into the transaction report.
    let caller_ops = call_opcodes(100_000, U256::from(2), 0, 0);
    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db
        .add_account(emitter_address, Account::default().with_bytecode(emitting_bytecode));
    let report = vm.execute().unwrap();
    assert_eq!(report.logs.len(), 1);
    assert_eq!(report.logs.first().unwrap().address, emitter_address);

    // Revert: the log is discarded with the rest of the sub-context.
    let mut vm = new_vm_with_ops_addr_bal(
        ops_to_bytecode(&caller_ops),
        Address::from_low_u64_be(1),
        U256::zero(),
    )
    .unwrap();
    vm.db.add_account(
        emitter_address,
        Account::default().with_bytecode(emitting_then_reverting),
    );
    let report = vm.execute().unwrap();
    assert!(report.logs.is_empty());
}

#[test]
fn create_transaction_deploys_code() {
    let origin = Address::from_low_u64_be(40);
    let init_code = Bytes::from(hex::decode("63FFFFFFFF6000526004601CF3").unwrap());

    let mut store = Db::new();
    store.add_account(origin, Account::default().with_balance(1_000.into()));
    let db = GeneralizedDatabase::new(Arc::new(store), CacheDB::new());

    let env = Environment {
        origin,
        gas_limit: 10_000_000,
        ..Default::default()
    };
    let mut vm = VM::new(env, db, TxKind::Create, U256::from(5), init_code).unwrap();

    let expected_address = calculate_create_address(origin, 0).unwrap();

    let report = vm.execute().unwrap();
    assert!(report.is_success());
    assert_eq!(report.created_address, Some(expected_address));

    let deployed = report.new_state.get(&expected_address).unwrap();
    assert_eq!(deployed.info.bytecode, Bytes::from(vec![0xFF; 4]));
    assert_eq!(deployed.info.nonce, 1);
    assert_eq!(deployed.info.balance, U256::from(5));

    let sender = report.new_state.get(&origin).unwrap();
    assert_eq!(sender.info.nonce, 1);
    assert_eq!(sender.info.balance, U256::from(995));
}

#[test]
fn create_address_derivation_vector() {
    let sender = Address::from_slice(
        &hex::decode("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap(),
    );
    let derived = calculate_create_address(sender, 0).unwrap();
    assert_eq!(
        derived,
        Address::from_slice(&hex::decode("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap())
    );
}

#[test]
fn create2_address_derivation_vector() {
    let derived = calculate_create2_address(
        Address::zero(),
        &Bytes::from_static(&[0x00]),
        U256::zero(),
    )
    .unwrap();
    assert_eq!(
        derived,
        Address::from_slice(&hex::decode("4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38").unwrap())
    );
}
