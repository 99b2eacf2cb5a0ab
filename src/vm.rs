use crate::{
    account::{Account, StorageSlot},
    call_frame::CallFrame,
    constants::MAX_CODE_SIZE,
    db::{cache, CacheDB, GeneralizedDatabase},
    environment::Environment,
    errors::{
        ExecutionReport, InternalError, OpcodeResult, TxResult, VMError,
    },
    gas_cost::CODE_DEPOSIT_COST,
    memory,
    precompiles::{execute_precompile, is_precompile},
    utils::{
        calculate_create_address, decrease_account_balance, get_account, get_account_mut,
        increase_account_balance, increment_account_nonce, transfer,
    },
};
use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use std::collections::HashSet;
use tracing::debug;

/// Target of a transaction: a message call to an existing account or a
/// contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxKind {
    Call(Address),
    Create,
}

/// Effects accrued during execution that settle after the transaction.
#[derive(Debug, Clone, Default)]
pub struct Substate {
    pub selfdestruct_set: HashSet<Address>,
    pub touched_accounts: HashSet<Address>,
    pub created_accounts: HashSet<Address>,
}

/// Snapshot taken when a frame is pushed. Restoring it is what makes a
/// reverting sub-context invisible to its parent.
#[derive(Debug, Clone)]
pub struct StateBackup {
    pub cache: CacheDB,
    pub substate: Substate,
    pub refunded_gas: u64,
}

impl StateBackup {
    pub fn new(cache: CacheDB, substate: Substate, refunded_gas: u64) -> StateBackup {
        StateBackup {
            cache,
            substate,
            refunded_gas,
        }
    }
}

/// Parent-side record of a pending sub-context: where the child's
/// output lands in the parent's memory and how to undo the value
/// transfer if the child reverts.
#[derive(Debug, Clone)]
pub struct RetData {
    pub is_create: bool,
    pub ret_offset: U256,
    pub ret_size: usize,
    pub should_transfer_value: bool,
    pub to: Address,
    pub msg_sender: Address,
    pub value: U256,
    pub max_message_call_gas: u64,
}

pub struct VM {
    pub call_frames: Vec<CallFrame>,
    pub env: Environment,
    pub accrued_substate: Substate,
    pub db: GeneralizedDatabase,
    pub tx_kind: TxKind,
    /// Overlay as it was before the transaction started.
    pub cache_backup: CacheDB,
    pub return_data: Vec<RetData>,
    pub backups: Vec<StateBackup>,
}

impl VM {
    pub fn new(
        env: Environment,
        mut db: GeneralizedDatabase,
        to: TxKind,
        value: U256,
        calldata: Bytes,
    ) -> Result<Self, VMError> {
        let mut touched_accounts = HashSet::from([env.origin]);
        let mut created_accounts = HashSet::new();

        let initial_call_frame = match &to {
            TxKind::Call(address_to) => {
                touched_accounts.insert(*address_to);
                let bytecode = get_account(&mut db, *address_to)?.info.bytecode;

                CallFrame::new(
                    env.origin,
                    *address_to,
                    *address_to,
                    bytecode,
                    value,
                    calldata,
                    false,
                    env.gas_limit,
                    0,
                    0,
                    false,
                )
            }
            TxKind::Create => {
                let sender_nonce = get_account(&mut db, env.origin)?.info.nonce;
                let new_contract_address = calculate_create_address(env.origin, sender_nonce)
                    .map_err(|_| {
                        VMError::Internal(InternalError::CouldNotComputeCreateAddress)
                    })?;

                touched_accounts.insert(new_contract_address);
                created_accounts.insert(new_contract_address);

                // The init code arrives as calldata and runs as the
                // frame's bytecode.
                CallFrame::new(
                    env.origin,
                    new_contract_address,
                    new_contract_address,
                    calldata,
                    value,
                    Bytes::new(),
                    false,
                    env.gas_limit,
                    0,
                    0,
                    true,
                )
            }
        };

        let cache_backup = db.cache.clone();

        Ok(Self {
            call_frames: vec![initial_call_frame],
            env,
            accrued_substate: Substate {
                touched_accounts,
                created_accounts,
                ..Default::default()
            },
            db,
            tx_kind: to,
            cache_backup,
            return_data: vec![],
            backups: vec![],
        })
    }

    pub fn is_create(&self) -> bool {
        matches!(self.tx_kind, TxKind::Create)
    }

    pub fn current_call_frame_mut(&mut self) -> Result<&mut CallFrame, VMError> {
        self.call_frames.last_mut().ok_or(VMError::Internal(
            InternalError::CouldNotAccessLastCallframe,
        ))
    }

    pub fn current_call_frame(&self) -> Result<&CallFrame, VMError> {
        self.call_frames.last().ok_or(VMError::Internal(
            InternalError::CouldNotAccessLastCallframe,
        ))
    }

    pub fn restore_state(&mut self, backup: StateBackup) {
        self.db.cache = backup.cache;
        self.accrued_substate = backup.substate;
        self.env.refunded_gas = backup.refunded_gas;
    }

    /// Main entry point: run the transaction against the overlay and
    /// fold the root frame's outcome into an [`ExecutionReport`].
    pub fn execute(&mut self) -> Result<ExecutionReport, VMError> {
        self.cache_backup = self.db.cache.clone();

        let initial_call_frame = self.current_call_frame()?.clone();
        let to = initial_call_frame.to;
        let value = initial_call_frame.msg_value;

        debug!(
            origin = ?self.env.origin,
            ?to,
            gas_limit = self.env.gas_limit,
            is_create = self.is_create(),
            "starting execution"
        );

        if self.is_create() {
            let new_account = get_account(&mut self.db, to)?;
            if new_account.has_code_or_nonce() {
                return self.handle_create_non_empty_account();
            }

            let sender_balance = get_account(&mut self.db, self.env.origin)?.info.balance;
            if sender_balance < value {
                return Err(VMError::InsufficientBalance);
            }

            let balance = new_account
                .info
                .balance
                .checked_add(value)
                .ok_or(VMError::BalanceOverflow)?;
            cache::insert_account(
                &mut self.db.cache,
                to,
                Account::new(balance, Bytes::new(), 1, Default::default()),
            );
            increment_account_nonce(&mut self.db, self.env.origin)?;
            decrease_account_balance(&mut self.db, self.env.origin, value)?;
        } else if !value.is_zero() {
            let sender_balance = get_account(&mut self.db, self.env.origin)?.info.balance;
            if sender_balance < value {
                return Err(VMError::InsufficientBalance);
            }
            transfer(&mut self.db, self.env.origin, to, value)?;
        }

        let backup = StateBackup::new(
            self.db.cache.clone(),
            self.accrued_substate.clone(),
            self.env.refunded_gas,
        );
        self.backups.push(backup);

        let mut report = self.run_execution()?;

        self.finalize_execution(to, value, &mut report)?;

        report.new_state = self.db.cache.clone();
        Ok(report)
    }

    /// Push-down automaton over the frame stack: execute one opcode of
    /// the top frame at a time; terminal frames are folded into their
    /// parent until the root frame halts.
    pub fn run_execution(&mut self) -> Result<ExecutionReport, VMError> {
        // A precompile sub-context has no bytecode to step through; it
        // is executed here in one shot and finalized like any frame.
        if is_precompile(&self.current_call_frame()?.code_address) {
            let mut current_call_frame = self
                .call_frames
                .pop()
                .ok_or(VMError::Internal(InternalError::CouldNotPopCallframe))?;
            let precompile_result = execute_precompile(&mut current_call_frame);
            let report = self.handle_precompile_result(precompile_result, &mut current_call_frame)?;
            if self.handle_return(&current_call_frame, &report)? {
                self.current_call_frame_mut()?.increment_pc_by(1)?;
            }
            return Ok(report);
        }

        loop {
            let opcode = self.current_call_frame()?.next_opcode();

            let op_result = self.handle_current_opcode(opcode);

            match op_result {
                Ok(OpcodeResult::Continue { pc_increment }) => self
                    .current_call_frame_mut()?
                    .increment_pc_by(pc_increment)?,
                Ok(OpcodeResult::Halt) => {
                    let mut current_call_frame = self
                        .call_frames
                        .pop()
                        .ok_or(VMError::Internal(InternalError::CouldNotPopCallframe))?;
                    let report = self.handle_opcode_result(&mut current_call_frame)?;
                    if self.handle_return(&current_call_frame, &report)? {
                        self.current_call_frame_mut()?.increment_pc_by(1)?;
                    } else {
                        return Ok(report);
                    }
                }
                Err(error) => {
                    if error.is_internal() {
                        return Err(error);
                    }
                    let mut current_call_frame = self
                        .call_frames
                        .pop()
                        .ok_or(VMError::Internal(InternalError::CouldNotPopCallframe))?;
                    let report = self.handle_opcode_error(error, &mut current_call_frame)?;
                    if self.handle_return(&current_call_frame, &report)? {
                        self.current_call_frame_mut()?.increment_pc_by(1)?;
                    } else {
                        return Ok(report);
                    }
                }
            }
        }
    }

    /// Fold a frame that halted through STOP, RETURN or SELFDESTRUCT.
    ///
    /// A creation frame additionally pays the code-deposit cost here
    /// and has its output installed as the deployed account's code;
    /// failing either turns the halt into a full revert.
    fn handle_opcode_result(
        &mut self,
        current_call_frame: &mut CallFrame,
    ) -> Result<ExecutionReport, VMError> {
        let backup = self
            .backups
            .pop()
            .ok_or(VMError::Internal(InternalError::CouldNotPopCallframe))?;

        if current_call_frame.is_create {
            let code = current_call_frame.output.clone();

            if code.len() > MAX_CODE_SIZE {
                return self.revert_frame(VMError::ContractOutputTooBig, current_call_frame, backup);
            }

            let deposit = CODE_DEPOSIT_COST
                .checked_mul(u64::try_from(code.len()).map_err(|_| VMError::VeryLargeNumber)?)
                .ok_or(InternalError::GasOverflow)?;
            if current_call_frame.increase_consumed_gas(deposit).is_err() {
                return self.revert_frame(
                    VMError::OutOfGas(crate::errors::OutOfGasError::MaxGasLimitExceeded),
                    current_call_frame,
                    backup,
                );
            }

            get_account_mut(&mut self.db, current_call_frame.to)?.info.bytecode = code;
            debug!(address = ?current_call_frame.to, "contract deployed");
        }

        Ok(ExecutionReport {
            result: TxResult::Success,
            new_state: self.db.cache.clone(),
            gas_used: current_call_frame.gas_used,
            gas_refunded: self.env.refunded_gas,
            output: current_call_frame.output.clone(),
            logs: current_call_frame.logs.clone(),
            created_address: None,
        })
    }

    /// Fold a frame that raised a reverting error. All remaining gas
    /// is consumed unless the frame reverted through REVERT.
    fn handle_opcode_error(
        &mut self,
        error: VMError,
        current_call_frame: &mut CallFrame,
    ) -> Result<ExecutionReport, VMError> {
        let backup = self
            .backups
            .pop()
            .ok_or(VMError::Internal(InternalError::CouldNotPopCallframe))?;
        self.revert_frame(error, current_call_frame, backup)
    }

    fn revert_frame(
        &mut self,
        error: VMError,
        current_call_frame: &mut CallFrame,
        backup: StateBackup,
    ) -> Result<ExecutionReport, VMError> {
        if error.is_internal() {
            return Err(error);
        }

        if error.should_consume_all_gas() {
            current_call_frame.gas_used = current_call_frame.gas_limit;
        }

        let output = if error == VMError::RevertOpcode {
            current_call_frame.output.clone()
        } else {
            Bytes::new()
        };

        self.restore_state(backup);
        debug!(depth = current_call_frame.depth, %error, "frame reverted");

        Ok(ExecutionReport {
            result: TxResult::Revert(error),
            new_state: self.db.cache.clone(),
            gas_used: current_call_frame.gas_used,
            gas_refunded: self.env.refunded_gas,
            output,
            logs: vec![],
            created_address: None,
        })
    }

    fn handle_precompile_result(
        &mut self,
        precompile_result: Result<Bytes, VMError>,
        current_call_frame: &mut CallFrame,
    ) -> Result<ExecutionReport, VMError> {
        match precompile_result {
            Ok(output) => {
                current_call_frame.output = output;
                self.handle_opcode_result(current_call_frame)
            }
            Err(error) => self.handle_opcode_error(error, current_call_frame),
        }
    }

    /// Finalize the parent of a terminal frame. Returns `false` when
    /// the terminal frame was the root.
    pub fn handle_return(
        &mut self,
        call_frame: &CallFrame,
        tx_report: &ExecutionReport,
    ) -> Result<bool, VMError> {
        if self.call_frames.is_empty() {
            // Root frame: put it back for callers to inspect.
            self.call_frames.push(call_frame.clone());
            return Ok(false);
        }
        let retdata = self
            .return_data
            .pop()
            .ok_or(VMError::Internal(InternalError::CouldNotPopCallframe))?;
        if retdata.is_create {
            self.handle_return_create(tx_report, retdata)?;
        } else {
            self.handle_return_call(call_frame, tx_report, retdata)?;
        }
        Ok(true)
    }

    fn handle_return_call(
        &mut self,
        call_frame: &CallFrame,
        tx_report: &ExecutionReport,
        retdata: RetData,
    ) -> Result<(), VMError> {
        // Unused gas flows back to the caller.
        let gas_left_from_new_call_frame = call_frame
            .gas_limit
            .checked_sub(tx_report.gas_used)
            .ok_or(InternalError::GasOverflow)?;
        {
            let current_call_frame = self.current_call_frame_mut()?;
            current_call_frame.gas_used = current_call_frame
                .gas_used
                .checked_sub(gas_left_from_new_call_frame)
                .ok_or(InternalError::GasOverflow)?;

            current_call_frame.logs.extend(tx_report.logs.clone());
            memory::try_store_range(
                &mut current_call_frame.memory,
                retdata.ret_offset,
                retdata.ret_size,
                &tx_report.output,
            )?;
            current_call_frame.sub_return_data = tx_report.output.clone();
        }

        match tx_report.result {
            TxResult::Success => {
                self.current_call_frame_mut()?
                    .stack
                    .push(crate::constants::SUCCESS_FOR_CALL)?;
            }
            TxResult::Revert(_) => {
                // The backup restore keeps the upfront transfer, which
                // must be undone by hand.
                if retdata.should_transfer_value && !retdata.value.is_zero() {
                    decrease_account_balance(&mut self.db, retdata.to, retdata.value)?;
                    increase_account_balance(&mut self.db, retdata.msg_sender, retdata.value)?;
                }
                self.current_call_frame_mut()?
                    .stack
                    .push(crate::constants::REVERT_FOR_CALL)?;
            }
        }
        Ok(())
    }

    fn handle_return_create(
        &mut self,
        tx_report: &ExecutionReport,
        retdata: RetData,
    ) -> Result<(), VMError> {
        let unused_gas = retdata
            .max_message_call_gas
            .checked_sub(tx_report.gas_used)
            .ok_or(InternalError::GasOverflow)?;

        {
            let current_call_frame = self.current_call_frame_mut()?;
            // Return the unspent part of the reservation.
            current_call_frame.gas_used = current_call_frame
                .gas_used
                .checked_sub(unused_gas)
                .ok_or(InternalError::GasOverflow)?;

            current_call_frame.logs.extend(tx_report.logs.clone());
        }

        match tx_report.result.clone() {
            TxResult::Success => {
                self.current_call_frame_mut()?
                    .stack
                    .push(crate::utils::address_to_word(retdata.to))?;
            }
            TxResult::Revert(error) => {
                // Deployment failed: the account must not exist and the
                // endowment goes back to the deployer.
                increase_account_balance(&mut self.db, retdata.msg_sender, retdata.value)?;
                cache::remove_account(&mut self.db.cache, &retdata.to);
                self.accrued_substate.created_accounts.remove(&retdata.to);

                let current_call_frame = self.current_call_frame_mut()?;
                if error == VMError::RevertOpcode {
                    current_call_frame.sub_return_data = tx_report.output.clone();
                }
                current_call_frame
                    .stack
                    .push(crate::constants::CREATE_DEPLOYMENT_FAIL)?;
            }
        }
        Ok(())
    }

    fn handle_create_non_empty_account(&mut self) -> Result<ExecutionReport, VMError> {
        self.db.cache = self.cache_backup.clone();
        Ok(ExecutionReport {
            result: TxResult::Revert(VMError::AddressAlreadyOccupied),
            new_state: self.db.cache.clone(),
            gas_used: self.env.gas_limit,
            gas_refunded: 0,
            output: Bytes::new(),
            logs: vec![],
            created_address: None,
        })
    }

    /// Settle the root frame's outcome at the transaction boundary.
    fn finalize_execution(
        &mut self,
        to: Address,
        value: U256,
        report: &mut ExecutionReport,
    ) -> Result<(), VMError> {
        match report.result {
            TxResult::Success => {
                if self.is_create() {
                    report.created_address = Some(to);
                }
            }
            TxResult::Revert(_) => {
                if self.is_create() {
                    increase_account_balance(&mut self.db, self.env.origin, value)?;
                    cache::remove_account(&mut self.db.cache, &to);
                    self.accrued_substate.created_accounts.remove(&to);
                } else if !value.is_zero() {
                    decrease_account_balance(&mut self.db, to, value)?;
                    increase_account_balance(&mut self.db, self.env.origin, value)?;
                }
            }
        }
        Ok(())
    }

    /// Current value of a storage slot, pulling cold slots in from the
    /// backing store and recording the transaction-original value.
    pub fn access_storage_slot(
        &mut self,
        address: Address,
        key: H256,
    ) -> Result<StorageSlot, VMError> {
        let storage_slot = match cache::get_account(&self.db.cache, &address) {
            Some(account) => match account.storage.get(&key) {
                Some(storage_slot) => storage_slot.clone(),
                None => {
                    let value = self.db.store.get_storage_slot(address, key);
                    StorageSlot {
                        original_value: value,
                        current_value: value,
                    }
                }
            },
            None => {
                let value = self.db.store.get_storage_slot(address, key);
                StorageSlot {
                    original_value: value,
                    current_value: value,
                }
            }
        };

        let account = get_account_mut(&mut self.db, address)?;
        account.storage.insert(key, storage_slot.clone());

        Ok(storage_slot)
    }

    pub fn update_account_storage(
        &mut self,
        address: Address,
        key: H256,
        new_value: U256,
    ) -> Result<(), VMError> {
        let account = get_account_mut(&mut self.db, address)?;
        let original_value = account
            .storage
            .get(&key)
            .map_or(U256::zero(), |slot| slot.original_value);
        account.storage.insert(
            key,
            StorageSlot {
                original_value,
                current_value: new_value,
            },
        );
        Ok(())
    }
}
