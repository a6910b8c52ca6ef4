//! Routes for the `users` namespace

use babel_rpc::validate::{ValidationResult, array_validator, string_validator};
use babel_rpc::{BabelClient, RpcRequest};

use crate::users::{
    BasicAccount, FullAccount, GetAccountArg, GetAccountBatchArg, GetAccountBatchError,
    GetAccountError, NoError, SpaceUsage,
};

const HOST: &str = "meta";

/// Length of a Dropbox account id (`dbid:` plus 35 characters).
const ACCOUNT_ID_LENGTH: usize = 40;

fn validate_account_id(account_id: &str) -> ValidationResult {
    string_validator(
        Some(ACCOUNT_ID_LENGTH),
        Some(ACCOUNT_ID_LENGTH),
        None,
        account_id,
    )
}

#[derive(Clone)]
pub struct UsersRoutes {
    client: BabelClient,
}

impl UsersRoutes {
    pub fn new(client: BabelClient) -> Self {
        Self { client }
    }

    /// Get information about a user's account.
    pub fn get_account(&self, account_id: &str) -> RpcRequest<BasicAccount, GetAccountError> {
        if let Err(e) = validate_account_id(account_id) {
            return RpcRequest::rejected(e.into());
        }
        let arg = GetAccountArg {
            account_id: account_id.to_string(),
        };
        self.client.rpc(HOST, "/users/get_account", &arg)
    }

    /// Get information about the current user's account.
    pub fn get_current_account(&self) -> RpcRequest<FullAccount, NoError> {
        self.client.rpc(HOST, "/users/get_current_account", &())
    }

    /// Get the space usage information for the current user's account.
    pub fn get_space_usage(&self) -> RpcRequest<SpaceUsage, NoError> {
        self.client.rpc(HOST, "/users/get_space_usage", &())
    }

    /// Get information about multiple user accounts.
    pub fn get_account_batch(
        &self,
        account_ids: &[String],
    ) -> RpcRequest<Vec<BasicAccount>, GetAccountBatchError> {
        let validation = array_validator(
            Some(1),
            None,
            |id: &String| validate_account_id(id),
            account_ids,
        );
        if let Err(e) = validation {
            return RpcRequest::rejected(e.into());
        }
        let arg = GetAccountBatchArg {
            account_ids: account_ids.to_vec(),
        };
        self.client.rpc(HOST, "/users/get_account_batch", &arg)
    }
}
