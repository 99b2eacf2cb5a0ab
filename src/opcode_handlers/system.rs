use crate::{
    account::Account,
    call_frame::CallFrame,
    constants::{
        CALL_DEPTH_LIMIT, CREATE_DEPLOYMENT_FAIL, INIT_CODE_MAX_SIZE, MAX_NONCE, REVERT_FOR_CALL,
    },
    db::cache,
    errors::{InternalError, OpcodeResult, OutOfGasError, VMError},
    gas_cost::{self, max_message_call_gas, SELFDESTRUCT_STATIC},
    memory::{self, calculate_memory_size},
    precompiles::is_precompile,
    utils::{
        calculate_create2_address, calculate_create_address, decrease_account_balance,
        get_account, get_account_mut, increase_account_balance, increment_account_nonce,
        transfer, word_to_address,
    },
    vm::{RetData, StateBackup, VM},
};
use bytes::Bytes;
use ethereum_types::{Address, U256};

// System Operations (10)
// Opcodes: CREATE, CALL, CALLCODE, RETURN, DELEGATECALL, CREATE2, STATICCALL, REVERT, INVALID, SELFDESTRUCT

impl VM {
    // CALL operation
    pub fn op_call(&mut self) -> Result<OpcodeResult, VMError> {
        let (
            gas,
            callee,
            value_to_transfer,
            current_memory_size,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        ) = {
            let current_call_frame = self.current_call_frame_mut()?;
            let gas = current_call_frame.stack.pop()?;
            let callee: Address = word_to_address(current_call_frame.stack.pop()?);
            let value_to_transfer: U256 = current_call_frame.stack.pop()?;
            let args_start_offset = current_call_frame.stack.pop()?;
            let args_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_| VMError::VeryLargeNumber)?;
            let return_data_start_offset = current_call_frame.stack.pop()?;
            let return_data_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_| VMError::VeryLargeNumber)?;
            let current_memory_size = current_call_frame.memory.len();
            (
                gas,
                callee,
                value_to_transfer,
                current_memory_size,
                args_start_offset,
                args_size,
                return_data_start_offset,
                return_data_size,
            )
        };

        // VALIDATIONS
        if self.current_call_frame()?.is_static && !value_to_transfer.is_zero() {
            return Err(VMError::OpcodeNotAllowedInStaticContext);
        }

        // GAS
        let new_memory_size_for_args = calculate_memory_size(args_start_offset, args_size)?;
        let new_memory_size_for_return_data =
            calculate_memory_size(return_data_start_offset, return_data_size)?;
        let new_memory_size = new_memory_size_for_args.max(new_memory_size_for_return_data);

        let gas_left = self.current_call_frame()?.gas_left()?;
        let (cost, gas_limit) = gas_cost::call(new_memory_size, current_memory_size, gas, gas_left)?;
        self.current_call_frame_mut()?.increase_consumed_gas(cost)?;

        let current_call_frame = self.current_call_frame()?;

        // OPERATION
        let msg_sender = current_call_frame.to; // The new sender is the current contract.
        let to = callee; // Sub-context account and code account coincide, unlike CALLCODE or DELEGATECALL.
        let is_static = current_call_frame.is_static;

        self.generic_call(
            gas_limit,
            value_to_transfer,
            msg_sender,
            to,
            callee,
            true,
            is_static,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        )
    }

    // CALLCODE operation
    pub fn op_callcode(&mut self) -> Result<OpcodeResult, VMError> {
        // STACK
        let (
            gas,
            code_address,
            value_to_transfer,
            current_memory_size,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        ) = {
            let current_call_frame = self.current_call_frame_mut()?;
            let gas = current_call_frame.stack.pop()?;
            let code_address = word_to_address(current_call_frame.stack.pop()?);
            let value_to_transfer = current_call_frame.stack.pop()?;
            let args_start_offset = current_call_frame.stack.pop()?;
            let args_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_err| VMError::VeryLargeNumber)?;
            let return_data_start_offset = current_call_frame.stack.pop()?;
            let return_data_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_err| VMError::VeryLargeNumber)?;
            let current_memory_size = current_call_frame.memory.len();
            (
                gas,
                code_address,
                value_to_transfer,
                current_memory_size,
                args_start_offset,
                args_size,
                return_data_start_offset,
                return_data_size,
            )
        };

        // GAS
        let new_memory_size_for_args = calculate_memory_size(args_start_offset, args_size)?;
        let new_memory_size_for_return_data =
            calculate_memory_size(return_data_start_offset, return_data_size)?;
        let new_memory_size = new_memory_size_for_args.max(new_memory_size_for_return_data);

        let gas_left = self.current_call_frame()?.gas_left()?;
        let (cost, gas_limit) = gas_cost::call(new_memory_size, current_memory_size, gas, gas_left)?;
        self.current_call_frame_mut()?.increase_consumed_gas(cost)?;

        let current_call_frame = self.current_call_frame()?;

        // Sender and recipient are the same; only the executed code comes from elsewhere.
        let msg_sender = current_call_frame.to;
        let to = current_call_frame.to;
        let is_static = current_call_frame.is_static;

        self.generic_call(
            gas_limit,
            value_to_transfer,
            msg_sender,
            to,
            code_address,
            true,
            is_static,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        )
    }

    // DELEGATECALL operation
    pub fn op_delegatecall(&mut self) -> Result<OpcodeResult, VMError> {
        // STACK
        let (
            gas,
            code_address,
            current_memory_size,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        ) = {
            let current_call_frame = self.current_call_frame_mut()?;
            let gas = current_call_frame.stack.pop()?;
            let code_address = word_to_address(current_call_frame.stack.pop()?);
            let args_start_offset = current_call_frame.stack.pop()?;
            let args_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_err| VMError::VeryLargeNumber)?;
            let return_data_start_offset = current_call_frame.stack.pop()?;
            let return_data_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_err| VMError::VeryLargeNumber)?;
            let current_memory_size = current_call_frame.memory.len();
            (
                gas,
                code_address,
                current_memory_size,
                args_start_offset,
                args_size,
                return_data_start_offset,
                return_data_size,
            )
        };

        // GAS
        let new_memory_size_for_args = calculate_memory_size(args_start_offset, args_size)?;
        let new_memory_size_for_return_data =
            calculate_memory_size(return_data_start_offset, return_data_size)?;
        let new_memory_size = new_memory_size_for_args.max(new_memory_size_for_return_data);

        let gas_left = self.current_call_frame()?.gas_left()?;
        let (cost, gas_limit) = gas_cost::call(new_memory_size, current_memory_size, gas, gas_left)?;
        self.current_call_frame_mut()?.increase_consumed_gas(cost)?;

        let current_call_frame = self.current_call_frame()?;

        // OPERATION: the callee code runs in the caller's context,
        // keeping sender and value of the current message.
        let msg_sender = current_call_frame.msg_sender;
        let value = current_call_frame.msg_value;
        let to = current_call_frame.to;
        let is_static = current_call_frame.is_static;

        self.generic_call(
            gas_limit,
            value,
            msg_sender,
            to,
            code_address,
            false,
            is_static,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        )
    }

    // STATICCALL operation
    pub fn op_staticcall(&mut self) -> Result<OpcodeResult, VMError> {
        // STACK
        let (
            gas,
            code_address,
            current_memory_size,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        ) = {
            let current_call_frame = self.current_call_frame_mut()?;
            let gas = current_call_frame.stack.pop()?;
            let code_address = word_to_address(current_call_frame.stack.pop()?);
            let args_start_offset = current_call_frame.stack.pop()?;
            let args_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_err| VMError::VeryLargeNumber)?;
            let return_data_start_offset = current_call_frame.stack.pop()?;
            let return_data_size: usize = current_call_frame
                .stack
                .pop()?
                .try_into()
                .map_err(|_err| VMError::VeryLargeNumber)?;
            let current_memory_size = current_call_frame.memory.len();
            (
                gas,
                code_address,
                current_memory_size,
                args_start_offset,
                args_size,
                return_data_start_offset,
                return_data_size,
            )
        };

        // GAS
        let new_memory_size_for_args = calculate_memory_size(args_start_offset, args_size)?;
        let new_memory_size_for_return_data =
            calculate_memory_size(return_data_start_offset, return_data_size)?;
        let new_memory_size = new_memory_size_for_args.max(new_memory_size_for_return_data);

        let gas_left = self.current_call_frame()?.gas_left()?;
        let (cost, gas_limit) = gas_cost::call(new_memory_size, current_memory_size, gas, gas_left)?;
        self.current_call_frame_mut()?.increase_consumed_gas(cost)?;

        // OPERATION: no value, and the whole sub-tree is read-only.
        let value = U256::zero();
        let msg_sender = self.current_call_frame()?.to;
        let to = code_address;

        self.generic_call(
            gas_limit,
            value,
            msg_sender,
            to,
            code_address,
            false,
            true,
            args_start_offset,
            args_size,
            return_data_start_offset,
            return_data_size,
        )
    }

    // CREATE operation
    pub fn op_create(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let value_in_wei_to_send = current_call_frame.stack.pop()?;
        let code_offset_in_memory = current_call_frame.stack.pop()?;
        let code_size_in_memory: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        let new_size = calculate_memory_size(code_offset_in_memory, code_size_in_memory)?;

        current_call_frame.increase_consumed_gas(gas_cost::create(
            new_size,
            current_call_frame.memory.len(),
            code_size_in_memory,
        )?)?;

        self.generic_create(
            value_in_wei_to_send,
            code_offset_in_memory,
            code_size_in_memory,
            None,
        )
    }

    // CREATE2 operation
    pub fn op_create2(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let value_in_wei_to_send = current_call_frame.stack.pop()?;
        let code_offset_in_memory = current_call_frame.stack.pop()?;
        let code_size_in_memory: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;
        let salt = current_call_frame.stack.pop()?;

        let new_size = calculate_memory_size(code_offset_in_memory, code_size_in_memory)?;

        current_call_frame.increase_consumed_gas(gas_cost::create_2(
            new_size,
            current_call_frame.memory.len(),
            code_size_in_memory,
        )?)?;

        self.generic_create(
            value_in_wei_to_send,
            code_offset_in_memory,
            code_size_in_memory,
            Some(salt),
        )
    }

    // RETURN operation
    pub fn op_return(&mut self) -> Result<OpcodeResult, VMError> {
        let current_call_frame = self.current_call_frame_mut()?;
        let offset = current_call_frame.stack.pop()?;
        let size: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        if size == 0 {
            return Ok(OpcodeResult::Halt);
        }

        let new_memory_size = calculate_memory_size(offset, size)?;
        let current_memory_size = current_call_frame.memory.len();

        current_call_frame
            .increase_consumed_gas(gas_cost::exit_opcode(new_memory_size, current_memory_size)?)?;

        current_call_frame.output =
            memory::load_range(&mut current_call_frame.memory, offset, size)?
                .to_vec()
                .into();

        Ok(OpcodeResult::Halt)
    }

    // REVERT operation
    pub fn op_revert(&mut self) -> Result<OpcodeResult, VMError> {
        // The halting data is captured here; the state rollback happens
        // when the frame's outcome is folded by the run loop.
        let current_call_frame = self.current_call_frame_mut()?;

        let offset = current_call_frame.stack.pop()?;
        let size: usize = current_call_frame
            .stack
            .pop()?
            .try_into()
            .map_err(|_err| VMError::VeryLargeNumber)?;

        let new_memory_size = calculate_memory_size(offset, size)?;
        let current_memory_size = current_call_frame.memory.len();

        current_call_frame
            .increase_consumed_gas(gas_cost::exit_opcode(new_memory_size, current_memory_size)?)?;

        current_call_frame.output =
            memory::load_range(&mut current_call_frame.memory, offset, size)?
                .to_vec()
                .into();

        Err(VMError::RevertOpcode)
    }

    /// ### INVALID operation
    /// Reverts consuming all gas, no return data.
    pub fn op_invalid(&mut self) -> Result<OpcodeResult, VMError> {
        Err(VMError::InvalidOpcode)
    }

    // SELFDESTRUCT operation
    pub fn op_selfdestruct(&mut self) -> Result<OpcodeResult, VMError> {
        let (target_address, to) = {
            let current_call_frame = self.current_call_frame_mut()?;
            if current_call_frame.is_static {
                return Err(VMError::OpcodeNotAllowedInStaticContext);
            }
            current_call_frame.increase_consumed_gas(SELFDESTRUCT_STATIC)?;
            let target_address = word_to_address(current_call_frame.stack.pop()?);
            (target_address, current_call_frame.to)
        };

        // Naming the executing account as the beneficiary redirects the
        // funds to the zero address.
        let recipient = if target_address == to {
            Address::zero()
        } else {
            target_address
        };

        let balance_to_transfer = get_account(&mut self.db, to)?.info.balance;
        increase_account_balance(&mut self.db, recipient, balance_to_transfer)?;

        let account = get_account_mut(&mut self.db, to)?;
        account.info.balance = U256::zero();
        account.destructed = true;

        self.accrued_substate.selfdestruct_set.insert(to);
        self.accrued_substate.touched_accounts.insert(recipient);

        Ok(OpcodeResult::Halt)
    }

    /// Common behavior for CREATE and CREATE2 opcodes
    pub fn generic_create(
        &mut self,
        value_in_wei_to_send: U256,
        code_offset_in_memory: U256,
        code_size_in_memory: usize,
        salt: Option<U256>,
    ) -> Result<OpcodeResult, VMError> {
        let (deployer_address, max_message_call_gas) = {
            let current_call_frame = self.current_call_frame_mut()?;
            // First: validations that revert consuming all gas.
            // 1. Can't be called in a static context.
            if current_call_frame.is_static {
                return Err(VMError::OpcodeNotAllowedInStaticContext);
            }
            // 2. Init code can't exceed its size cap.
            if code_size_in_memory > INIT_CODE_MAX_SIZE {
                return Err(VMError::OutOfGas(OutOfGasError::ConsumedGasOverflow));
            }

            // Reserve gas for the sub-context.
            let max_message_call_gas = max_message_call_gas(current_call_frame)?;
            current_call_frame.increase_consumed_gas(max_message_call_gas)?;

            // A fresh sub-context invalidates previous return data.
            current_call_frame.sub_return_data = Bytes::new();

            (current_call_frame.to, max_message_call_gas)
        };

        let deployer_account_info = get_account(&mut self.db, deployer_address)?.info;

        let code = Bytes::from(
            memory::load_range(
                &mut self.current_call_frame_mut()?.memory,
                code_offset_in_memory,
                code_size_in_memory,
            )?
            .to_vec(),
        );

        let new_address = match salt {
            Some(salt) => calculate_create2_address(deployer_address, &code, salt)?,
            None => calculate_create_address(deployer_address, deployer_account_info.nonce)?,
        };

        self.accrued_substate.touched_accounts.insert(new_address);

        let new_depth = {
            let current_call_frame = self.current_call_frame_mut()?;
            let new_depth = current_call_frame
                .depth
                .checked_add(1)
                .ok_or(InternalError::ArithmeticOperationOverflow)?;

            // Second: validations that push 0 and return the reserved gas.
            // 1. Sender doesn't have enough balance to send the value.
            // 2. Depth limit has been reached.
            // 3. Sender nonce is max.
            if deployer_account_info.balance < value_in_wei_to_send
                || new_depth > CALL_DEPTH_LIMIT
                || deployer_account_info.nonce == MAX_NONCE
            {
                current_call_frame.gas_used = current_call_frame
                    .gas_used
                    .checked_sub(max_message_call_gas)
                    .ok_or(VMError::Internal(InternalError::GasOverflow))?;
                current_call_frame.stack.push(CREATE_DEPLOYMENT_FAIL)?;
                return Ok(OpcodeResult::Continue { pc_increment: 1 });
            }
            new_depth
        };

        // Third: a collision pushes 0 without returning the reserved
        // gas, but still increments the deployer's nonce.
        let new_account = get_account(&mut self.db, new_address)?;
        if new_account.has_code_or_nonce() {
            increment_account_nonce(&mut self.db, deployer_address)?;
            self.current_call_frame_mut()?
                .stack
                .push(CREATE_DEPLOYMENT_FAIL)?;
            return Ok(OpcodeResult::Continue { pc_increment: 1 });
        }

        // Fourth: state changes.
        // 1. The created account starts at nonce 1 and absorbs any
        //    balance already sitting at the address.
        let new_balance = value_in_wei_to_send
            .checked_add(new_account.info.balance)
            .ok_or(VMError::BalanceOverflow)?;
        cache::insert_account(
            &mut self.db.cache,
            new_address,
            Account::new(new_balance, Bytes::new(), 1, Default::default()),
        );

        // 2. Increment the deployer's nonce.
        increment_account_nonce(&mut self.db, deployer_address)?;

        // 3. Decrease the deployer's balance.
        decrease_account_balance(&mut self.db, deployer_address, value_in_wei_to_send)?;

        self.return_data.push(RetData {
            is_create: true,
            ret_offset: U256::zero(),
            ret_size: 0,
            should_transfer_value: true,
            to: new_address,
            msg_sender: deployer_address,
            value: value_in_wei_to_send,
            max_message_call_gas,
        });

        let new_call_frame = CallFrame::new(
            deployer_address,
            new_address,
            new_address,
            code,
            value_in_wei_to_send,
            Bytes::new(),
            false,
            max_message_call_gas,
            0,
            new_depth,
            true,
        );
        self.call_frames.push(new_call_frame);

        self.accrued_substate.created_accounts.insert(new_address);

        // Snapshot for rollback if the sub-context reverts.
        let backup = StateBackup::new(
            self.db.cache.clone(),
            self.accrued_substate.clone(),
            self.env.refunded_gas,
        );
        self.backups.push(backup);

        Ok(OpcodeResult::Continue { pc_increment: 0 })
    }

    #[allow(clippy::too_many_arguments)]
    /// Shared tail of the CALL family: builds the sub-context frame,
    /// moves the value, and records how the parent folds the child
    /// back in.
    pub fn generic_call(
        &mut self,
        gas_limit: u64,
        value: U256,
        msg_sender: Address,
        to: Address,
        code_address: Address,
        should_transfer_value: bool,
        is_static: bool,
        args_offset: U256,
        args_size: usize,
        ret_offset: U256,
        ret_size: usize,
    ) -> Result<OpcodeResult, VMError> {
        let sender_balance = get_account(&mut self.db, msg_sender)?.info.balance;

        let calldata = {
            let current_call_frame = self.current_call_frame_mut()?;
            // A fresh sub-context invalidates previous return data.
            current_call_frame.sub_return_data = Bytes::new();

            memory::load_range(&mut current_call_frame.memory, args_offset, args_size)?.to_vec()
        };

        // 1. The sender must be able to pay the transferred value.
        if should_transfer_value && sender_balance < value {
            return Err(VMError::InsufficientBalance);
        }

        let new_depth = {
            let current_call_frame = self.current_call_frame_mut()?;

            // 2. The depth limit is enforced before any frame is built;
            //    overrunning it fails the call but not the caller.
            let new_depth = current_call_frame
                .depth
                .checked_add(1)
                .ok_or(InternalError::ArithmeticOperationOverflow)?;

            if new_depth > CALL_DEPTH_LIMIT {
                current_call_frame.gas_used = current_call_frame
                    .gas_used
                    .checked_sub(gas_limit)
                    .ok_or(InternalError::GasOverflow)?;
                current_call_frame.stack.push(REVERT_FOR_CALL)?;
                return Ok(OpcodeResult::Continue { pc_increment: 1 });
            }
            new_depth
        };

        // Transfer value from caller to callee.
        if should_transfer_value && !value.is_zero() {
            transfer(&mut self.db, msg_sender, to, value)?;
        }

        let bytecode = get_account(&mut self.db, code_address)?.info.bytecode;
        self.accrued_substate.touched_accounts.insert(to);

        self.return_data.push(RetData {
            is_create: false,
            ret_offset,
            ret_size,
            should_transfer_value,
            to,
            msg_sender,
            value,
            max_message_call_gas: gas_limit,
        });

        let new_call_frame = CallFrame::new(
            msg_sender,
            to,
            code_address,
            bytecode,
            value,
            calldata.into(),
            is_static,
            gas_limit,
            0,
            new_depth,
            false,
        );
        self.call_frames.push(new_call_frame);

        // Snapshot for rollback if the sub-context reverts.
        let backup = StateBackup::new(
            self.db.cache.clone(),
            self.accrued_substate.clone(),
            self.env.refunded_gas,
        );
        self.backups.push(backup);

        if is_precompile(&code_address) {
            let _report = self.run_execution()?;
        }

        Ok(OpcodeResult::Continue { pc_increment: 0 })
    }
}
